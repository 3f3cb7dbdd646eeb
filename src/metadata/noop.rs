//! No-op metadata backend.
//!
//! Every call succeeds without touching storage, which leaves the cache's
//! in-memory index as the only copy of the metadata. Useful for tests and
//! ephemeral deployments.

use super::backend::MetaDataStore;
use crate::error::Result;
use crate::image::Image;
use async_trait::async_trait;

/// Metadata backend that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetaStore;

impl NoopMetaStore {
    /// Creates a new no-op backend.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetaDataStore for NoopMetaStore {
    async fn write(&self, _image: &Image) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _scope: &str, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _tenant: &str, _id: &str) -> Result<Option<Image>> {
        Ok(None)
    }

    async fn find(&self, _id: &str) -> Result<Option<Image>> {
        Ok(None)
    }

    async fn get_all(&self, _tenant: &str) -> Result<Vec<Image>> {
        Ok(Vec::new())
    }
}
