//! Backend trait for image content.

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Upload body as seen by a raw data backend.
pub type ImageReader<'a> = dyn AsyncRead + Send + Unpin + 'a;

/// Backend trait for image content storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Concurrent calls for different IDs must not interfere with each other.
#[async_trait]
pub trait RawDataStore: Send + Sync + 'static {
    /// Stores the full content of `body` as the blob for `id`.
    ///
    /// Overwrites an existing blob. A failure part way through may leave a
    /// truncated blob behind; cleaning it up is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is invalid, reading `body` fails, or the
    /// blob cannot be written.
    async fn write(&self, id: &str, body: &mut ImageReader<'_>) -> Result<()>;

    /// Removes the blob for `id`.
    ///
    /// Removing a blob that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is invalid or deletion fails.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Returns the stored length of the blob for `id` in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob does not exist or cannot be inspected.
    async fn image_size(&self, id: &str) -> Result<u64>;
}
