//! Filesystem-backed raw data backend.
//!
//! Each image is a single file named by its ID directly under the mount
//! point. There is no sharding into subdirectories.

use super::backend::{ImageReader, RawDataStore};
use crate::error::{Error, Result};
use crate::validation::validate_image_id;
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};

/// Buffer size for streaming uploads to disk.
pub const COPY_BUFFER_SIZE: usize = 1 << 16;

/// Filesystem-backed raw data backend.
///
/// # Thread Safety
///
/// `FilesystemRawStore` is `Clone` and can be shared across threads.
/// Concurrent access to distinct files is left to the operating system.
#[derive(Debug, Clone)]
pub struct FilesystemRawStore {
    mount_point: PathBuf,
}

impl FilesystemRawStore {
    /// Creates the store rooted at `mount_point`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount point cannot be created.
    pub fn open<P: AsRef<Path>>(mount_point: P) -> Result<Self> {
        let mount_point = mount_point.as_ref().to_path_buf();

        fs::create_dir_all(&mount_point).map_err(|e| {
            Error::io(
                format!("creating image mount point {}", mount_point.display()),
                e,
            )
        })?;

        Ok(Self { mount_point })
    }

    /// Directory holding the image files.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Returns the file path for an image, rejecting unsafe IDs.
    pub fn image_path(&self, id: &str) -> Result<PathBuf> {
        validate_image_id(id)?;
        Ok(self.mount_point.join(id))
    }
}

#[async_trait]
impl RawDataStore for FilesystemRawStore {
    async fn write(&self, id: &str, body: &mut ImageReader<'_>) -> Result<()> {
        let path = self.image_path(id)?;

        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::io(format!("creating image file {}", path.display()), e))?;

        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, body);
        let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);

        let written = tokio::io::copy_buf(&mut reader, &mut writer)
            .await
            .map_err(|e| Error::io(format!("writing image {id}"), e))?;

        writer
            .flush()
            .await
            .map_err(|e| Error::io(format!("flushing image {id}"), e))?;
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| Error::io(format!("syncing image {id}"), e))?;

        tracing::debug!(image_id = %id, bytes = written, "Wrote image file");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.image_path(id)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(image_id = %id, "Image file already absent");
                Ok(())
            },
            Err(e) => Err(Error::io(format!("deleting image {id}"), e)),
        }
    }

    async fn image_size(&self, id: &str) -> Result<u64> {
        let path = self.image_path(id)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::io(format!("reading size of image {id}"), e))?;

        Ok(metadata.len())
    }
}
