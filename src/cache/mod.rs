//! Image cache: one consistent view over image metadata and content.
//!
//! [`ImageCache`] keeps an in-memory index of image records in front of a
//! [`MetaDataStore`] (durable source of truth) and a [`RawDataStore`]
//! (image content). The API layer resolves the caller's tenant and then
//! calls into the cache; the cache enforces ownership and visibility and
//! drives the upload lifecycle:
//!
//! ```text
//! Created ──upload──> Saving ──write + size ok──> Active
//!                        └────write or size failed──> Killed
//! ```
//!
//! # Locking
//!
//! A single read/write lock guards the index together with the metadata
//! calls that accompany each mutation. Image content is never transferred
//! while the lock is held: an upload claims the image by moving it to
//! `Saving`, releases the lock, streams the body into the raw store, and
//! re-takes the lock only to record the final state. Readers see `Saving`
//! for the whole transfer, and a second upload of the same image is refused
//! with [`Error::ImageSaving`].
//!
//! # Example
//!
//! ```ignore
//! use ciao_image::{Image, ImageCache, Visibility};
//!
//! let cache = ImageCache::memory();
//! cache.create_image(Image::new("img-1", "t1", "cirros", Visibility::Private)).await?;
//! cache.upload_image("t1", "img-1", &b"disk bytes"[..]).await?;
//! let image = cache.get_image("t1", "img-1").await?;
//! ```

#[cfg(test)]
mod tests;

use crate::error::{Error, Result};
use crate::image::{Image, State};
use crate::metadata::{MetaDataStore, NoopMetaStore};
use crate::raw::{ImageReader, MemoryRawStore, RawDataStore};
use crate::validation::validate_image_id;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::RwLock;

type Index = HashMap<String, Image>;

/// Thread-safe image cache over a metadata backend and a raw data backend.
///
/// # Thread Safety
///
/// `ImageCache` is `Clone`; clones share the same index and backends, so a
/// handle can be given to every request task.
#[derive(Clone)]
pub struct ImageCache {
    images: Arc<RwLock<Index>>,
    raw: Arc<dyn RawDataStore>,
    meta: Arc<dyn MetaDataStore>,
}

impl ImageCache {
    /// Creates a cache over the given backends with an empty index.
    pub fn new<R: RawDataStore, M: MetaDataStore>(raw: R, meta: M) -> Self {
        Self::with_backends(Arc::new(raw), Arc::new(meta))
    }

    /// Creates a cache from shared backend trait objects.
    ///
    /// Useful when the backends are chosen at runtime.
    pub fn with_backends(raw: Arc<dyn RawDataStore>, meta: Arc<dyn MetaDataStore>) -> Self {
        Self {
            images: Arc::new(RwLock::new(HashMap::new())),
            raw,
            meta,
        }
    }

    /// Creates a purely in-memory cache.
    ///
    /// Metadata lives only in the index and content in a [`MemoryRawStore`].
    /// All data is lost when the process exits.
    pub fn memory() -> Self {
        Self::new(MemoryRawStore::new(), NoopMetaStore::new())
    }

    /// Adds an image, or replaces the one with the same ID.
    ///
    /// The record is indexed and persisted under one write lock. If the
    /// metadata backend rejects it, the index is restored to what it held
    /// before, so a failed create is never visible. A replaced record stored
    /// under a different scope (for example a private image recreated as
    /// public) is removed once the new one is written.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidImage`] if the ID is not usable as a storage key
    /// - [`Error::ImageSaving`] if the image being replaced is mid-upload
    /// - the metadata backend's error if persisting fails
    pub async fn create_image(&self, image: Image) -> Result<()> {
        validate_image_id(&image.id)?;

        let mut images = self.images.write().await;

        let stored = match images.get(&image.id) {
            Some(existing) if existing.state == State::Saving => {
                return Err(Error::ImageSaving);
            },
            Some(existing) => Some(existing.clone()),
            None => self.meta.find(&image.id).await?,
        };

        let previous = images.insert(image.id.clone(), image.clone());

        if let Err(err) = self.meta.write(&image).await {
            match previous {
                Some(previous) => images.insert(image.id.clone(), previous),
                None => images.remove(&image.id),
            };
            tracing::warn!(image_id = %image.id, error = %err, "Failed to persist new image");
            return Err(err);
        }

        // One record per ID: drop the replaced one if it lived under another scope.
        if let Some(stored) = stored
            && stored.scope() != image.scope()
        {
            self.meta.delete(stored.scope(), &image.id).await?;
        }

        tracing::info!(
            image_id = %image.id,
            tenant = %image.tenant_id,
            visibility = %image.visibility,
            "Image created"
        );
        Ok(())
    }

    /// Returns the image `id` as seen by `tenant`.
    ///
    /// Served from the index when possible; on a miss the metadata backend
    /// is consulted and the result is cached.
    ///
    /// # Errors
    ///
    /// - [`Error::NoImage`] if the image does not exist or belongs privately
    ///   to another tenant
    /// - the metadata backend's error if the lookup fails
    pub async fn get_image(&self, tenant: &str, id: &str) -> Result<Image> {
        {
            let images = self.images.read().await;
            if let Some(image) = images.get(id) {
                return visible(image, tenant);
            }
        }

        let mut images = self.images.write().await;
        self.lookup(&mut images, tenant, id).await
    }

    /// Returns every image owned by `tenant` together with all public images.
    ///
    /// The order of the returned images is unspecified.
    ///
    /// # Errors
    ///
    /// Returns the metadata backend's error if listing fails.
    pub async fn get_all_images(&self, tenant: &str) -> Result<Vec<Image>> {
        let images = self.images.read().await;

        let mut merged: Index = self
            .meta
            .get_all(tenant)
            .await?
            .into_iter()
            .map(|image| (image.id.clone(), image))
            .collect();

        // The index is fresher than the store while an upload is running.
        for image in images.values().filter(|image| image.visible_to(tenant)) {
            merged.insert(image.id.clone(), image.clone());
        }

        Ok(merged.into_values().collect())
    }

    /// Replaces the stored record for `image.id` with `image`.
    ///
    /// The whole record is overwritten; there is no field merge. The
    /// original creation time is kept. If the new record lives under a
    /// different scope (for example a private image made public), the old
    /// record is removed.
    ///
    /// # Errors
    ///
    /// - [`Error::NoImage`] if no record with that ID exists
    /// - [`Error::ImageSaving`] if the image is mid-upload
    /// - the metadata backend's error if persisting fails
    pub async fn update_image(&self, image: Image) -> Result<()> {
        validate_image_id(&image.id)?;

        let mut images = self.images.write().await;

        let existing = match images.get(&image.id) {
            Some(existing) => existing.clone(),
            None => self.meta.find(&image.id).await?.ok_or(Error::NoImage)?,
        };

        if existing.state == State::Saving {
            return Err(Error::ImageSaving);
        }

        let mut image = image;
        image.create_time = existing.create_time;

        self.meta.write(&image).await?;
        if existing.scope() != image.scope() {
            self.meta.delete(existing.scope(), &existing.id).await?;
        }

        tracing::info!(image_id = %image.id, state = %image.state, "Image updated");
        images.insert(image.id.clone(), image);
        Ok(())
    }

    /// Deletes image `id` on behalf of `tenant`.
    ///
    /// An active image's content is removed before its metadata. If the
    /// content cannot be removed the metadata is left in place.
    ///
    /// # Errors
    ///
    /// - [`Error::NoImage`] if the image does not exist or belongs privately
    ///   to another tenant
    /// - [`Error::ImageSaving`] if the image is mid-upload
    /// - the raw or metadata backend's error if removal fails
    pub async fn delete_image(&self, tenant: &str, id: &str) -> Result<()> {
        let mut images = self.images.write().await;

        let image = self.lookup(&mut images, tenant, id).await?;

        if image.state == State::Saving {
            return Err(Error::ImageSaving);
        }

        if image.state == State::Active {
            self.raw.delete(id).await?;
        }

        self.meta.delete(image.scope(), id).await?;
        images.remove(id);

        tracing::info!(image_id = %id, tenant = %tenant, "Image deleted");
        Ok(())
    }

    /// Stores the content of image `id` from `body`.
    ///
    /// Moves the image to `Saving`, streams `body` into the raw store
    /// without holding the lock, then records `Active` with the stored size,
    /// or `Killed` if the transfer failed. The final state is written to the
    /// metadata backend before returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::NoImage`] if the image does not exist or belongs privately
    ///   to another tenant
    /// - [`Error::ImageSaving`] if another upload of the image is in flight
    /// - the raw backend's error if the transfer failed (the image is `Killed`)
    /// - the metadata backend's error if the final state could not be stored
    pub async fn upload_image<R>(&self, tenant: &str, id: &str, body: R) -> Result<()>
    where
        R: AsyncRead + Send + Unpin,
    {
        let claimed = {
            let mut images = self.images.write().await;
            let image = self.lookup(&mut images, tenant, id).await?;

            if image.state == State::Saving {
                return Err(Error::ImageSaving);
            }

            let mut image = image;
            image.state = State::Saving;
            images.insert(id.to_string(), image.clone());
            image
        };

        tracing::info!(image_id = %id, tenant = %tenant, "Image upload started");

        let mut body = body;
        let outcome = self.store_content(id, &mut body).await;

        let mut images = self.images.write().await;
        let mut image = images.get(id).cloned().unwrap_or(claimed);

        match &outcome {
            Ok(size) => {
                image.state = State::Active;
                image.size = *size;
            },
            Err(err) => {
                tracing::warn!(image_id = %id, error = %err, "Image upload failed");
                image.state = State::Killed;
                image.size = 0;
            },
        }

        images.insert(id.to_string(), image.clone());
        let recorded = self.meta.write(&image).await;
        drop(images);

        if let Err(err) = &recorded {
            tracing::error!(
                image_id = %id,
                state = %image.state,
                error = %err,
                "Failed to record upload outcome"
            );
        }

        let size = outcome?;
        recorded?;

        tracing::info!(image_id = %id, size, "Image uploaded");
        Ok(())
    }

    /// Writes the blob and reads back its stored size.
    async fn store_content(&self, id: &str, body: &mut ImageReader<'_>) -> Result<u64> {
        self.raw.write(id, body).await?;
        self.raw.image_size(id).await
    }

    /// Finds `id` in the index, falling back to the metadata backend.
    ///
    /// Must be called with the index write lock held; a record fetched from
    /// the backend is cached.
    async fn lookup(&self, images: &mut Index, tenant: &str, id: &str) -> Result<Image> {
        if let Some(image) = images.get(id) {
            return visible(image, tenant);
        }

        tracing::debug!(image_id = %id, tenant = %tenant, "Image cache miss");

        let image = self.meta.get(tenant, id).await?.ok_or(Error::NoImage)?;
        images.insert(id.to_string(), image.clone());
        visible(&image, tenant)
    }
}

/// Returns a copy of `image` if `tenant` may see it.
fn visible(image: &Image, tenant: &str) -> Result<Image> {
    if image.visible_to(tenant) {
        Ok(image.clone())
    } else {
        Err(Error::NoImage)
    }
}
