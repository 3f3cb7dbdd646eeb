//! In-memory raw data backend.
//!
//! Keeps every blob in a `DashMap`. Nothing survives the process, which
//! makes it a good fit for tests and ephemeral deployments.

use super::backend::{ImageReader, RawDataStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// In-memory raw data backend using DashMap.
///
/// `MemoryRawStore` is `Clone`; clones share the same blobs, so a test can
/// keep a handle to inspect what the cache stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryRawStore {
    blobs: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryRawStore {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the blob stored for `id`.
    pub fn blob(&self, id: &str) -> Option<Vec<u8>> {
        self.blobs.get(id).map(|b| b.value().clone())
    }

    /// Returns true if a blob is stored for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.blobs.contains_key(id)
    }

    /// Returns the number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl RawDataStore for MemoryRawStore {
    async fn write(&self, id: &str, body: &mut ImageReader<'_>) -> Result<()> {
        let mut data = Vec::new();
        let result = body.read_to_end(&mut data).await;

        // Keep whatever arrived, like a truncated file would.
        self.blobs.insert(id.to_string(), data);

        result
            .map(|_| ())
            .map_err(|e| Error::io(format!("writing image {id}"), e))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.blobs.remove(id);
        Ok(())
    }

    async fn image_size(&self, id: &str) -> Result<u64> {
        self.blobs
            .get(id)
            .map(|b| b.value().len() as u64)
            .ok_or_else(|| {
                Error::io(
                    format!("reading size of image {id}"),
                    io::Error::new(io::ErrorKind::NotFound, "no such image blob"),
                )
            })
    }
}
