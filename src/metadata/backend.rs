//! Backend trait for image metadata.
//!
//! Defines the interface that all metadata backends must implement,
//! so the cache can run on redb, in memory, or anything else.

use crate::error::Result;
use crate::image::Image;
use async_trait::async_trait;

/// Backend trait for image metadata storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Each call must be atomic on its own: a reader never observes a
/// partially written record.
#[async_trait]
pub trait MetaDataStore: Send + Sync + 'static {
    /// Stores an image record under its scope, replacing any previous record.
    ///
    /// The scope is the owning tenant, or the shared public scope for
    /// public images.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or persisted.
    async fn write(&self, image: &Image) -> Result<()>;

    /// Removes the record `id` stored under `scope`.
    ///
    /// Idempotent: removing an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, scope: &str, id: &str) -> Result<()>;

    /// Looks up `id` as seen by `tenant`.
    ///
    /// Searches the tenant's own scope first, then the public scope.
    /// Returns `Ok(None)` if neither holds the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails or the stored
    /// record cannot be decoded.
    async fn get(&self, tenant: &str, id: &str) -> Result<Option<Image>>;

    /// Looks up `id` in every scope, regardless of owner.
    ///
    /// For administrative paths that must find a record before knowing
    /// which scope it lives in. Returns `Ok(None)` if no scope holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails or the stored
    /// record cannot be decoded.
    async fn find(&self, id: &str) -> Result<Option<Image>>;

    /// Lists every image owned by `tenant` plus every public image.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get_all(&self, tenant: &str) -> Result<Vec<Image>>;
}
