//! Tests for the image cache.

use super::*;
use crate::image::Visibility;
use crate::metadata::RedbMetaStore;
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, ReadBuf};

fn private_image(id: &str, tenant: &str) -> Image {
    Image::new(id, tenant, "cirros", Visibility::Private)
}

fn public_image(id: &str, tenant: &str) -> Image {
    Image::new(id, tenant, "ubuntu", Visibility::Public)
}

fn redb_cache() -> (ImageCache, RedbMetaStore, MemoryRawStore, TempDir) {
    let tmp = TempDir::new().unwrap();
    let meta = RedbMetaStore::open(tmp.path().join("images.redb")).unwrap();
    let raw = MemoryRawStore::new();
    let cache = ImageCache::new(raw.clone(), meta.clone());
    (cache, meta, raw, tmp)
}

/// Polls until the image reaches `state`, failing after a second.
async fn wait_for_state(cache: &ImageCache, tenant: &str, id: &str, state: State) {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if cache.get_image(tenant, id).await.unwrap().state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("image {id} never reached {state}"));
}

/// Metadata backend whose writes always fail.
struct FailingMetaStore;

#[async_trait]
impl MetaDataStore for FailingMetaStore {
    async fn write(&self, _image: &Image) -> Result<()> {
        Err(Error::io("writing metadata", io::Error::other("disk full")))
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

/// Raw backend that stores blobs but refuses to delete them.
struct UndeletableRawStore(MemoryRawStore);

#[async_trait]
impl RawDataStore for UndeletableRawStore {
    async fn write(&self, id: &str, body: &mut ImageReader<'_>) -> Result<()> {
        self.0.write(id, body).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        Err(Error::io(
            format!("deleting image {id}"),
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only mount"),
        ))
    }

    async fn image_size(&self, id: &str) -> Result<u64> {
        self.0.image_size(id).await
    }
}

/// Yields a few bytes, then fails like a dropped client connection.
struct DisconnectingReader {
    sent: bool,
}

impl AsyncRead for DisconnectingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client disconnected",
            )))
        } else {
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }
}

// =============================================================================
// Create / Get
// =============================================================================

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let (cache, _meta, _raw, _tmp) = redb_cache();
    let mut img = private_image("img-1", "t1");
    img.tags = "os=cirros".to_string();

    cache.create_image(img.clone()).await.unwrap();

    assert_eq!(cache.get_image("t1", "img-1").await.unwrap(), img);
}

#[tokio::test]
async fn test_get_nonexistent_image() {
    let cache = ImageCache::memory();
    let err = cache.get_image("t1", "missing").await.unwrap_err();
    assert!(matches!(err, Error::NoImage));
}

#[tokio::test]
async fn test_create_rejects_invalid_id() {
    let cache = ImageCache::memory();

    let err = cache.create_image(private_image("", "t1")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidImage(_)));

    let err = cache
        .create_image(private_image("../escape", "t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidImage(_)));
}

#[tokio::test]
async fn test_create_rolls_back_on_persist_failure() {
    let cache = ImageCache::new(MemoryRawStore::new(), FailingMetaStore);

    let err = cache
        .create_image(private_image("img-1", "t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));

    let err = cache.get_image("t1", "img-1").await.unwrap_err();
    assert!(matches!(err, Error::NoImage));
    assert!(cache.get_all_images("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_is_upsert() {
    let cache = ImageCache::memory();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let mut replacement = private_image("img-1", "t1");
    replacement.name = "renamed".to_string();
    cache.create_image(replacement).await.unwrap();

    assert_eq!(cache.get_image("t1", "img-1").await.unwrap().name, "renamed");
    assert_eq!(cache.get_all_images("t1").await.unwrap().len(), 1);
}

/// Recreates a private image as public, then deletes it as its owner.
async fn publish_by_upsert_then_delete(cache: &ImageCache) {
    cache.create_image(private_image("img-1", "t1")).await.unwrap();
    cache.create_image(public_image("img-1", "t1")).await.unwrap();

    assert_eq!(cache.get_all_images("t1").await.unwrap().len(), 1);
    assert_eq!(cache.get_all_images("t2").await.unwrap().len(), 1);
    assert_eq!(
        cache.get_image("t1", "img-1").await.unwrap().visibility,
        Visibility::Public
    );

    cache.delete_image("t1", "img-1").await.unwrap();

    assert!(matches!(
        cache.get_image("t1", "img-1").await.unwrap_err(),
        Error::NoImage
    ));
    assert!(cache.get_all_images("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_changing_scope_in_memory() {
    publish_by_upsert_then_delete(&ImageCache::memory()).await;
}

#[tokio::test]
async fn test_upsert_changing_scope_leaves_no_stale_record() {
    let (cache, meta, raw, _tmp) = redb_cache();
    publish_by_upsert_then_delete(&cache).await;

    assert!(meta.find("img-1").await.unwrap().is_none());
    assert!(meta.get_all("t1").await.unwrap().is_empty());

    let restarted = ImageCache::new(raw, meta);
    assert!(matches!(
        restarted.get_image("t1", "img-1").await.unwrap_err(),
        Error::NoImage
    ));
}

#[tokio::test]
async fn test_upsert_to_private_hides_image_from_others() {
    let (cache, meta, raw, _tmp) = redb_cache();
    cache.create_image(public_image("img-1", "t1")).await.unwrap();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    assert!(meta.get("t2", "img-1").await.unwrap().is_none());

    let restarted = ImageCache::new(raw, meta);
    assert!(matches!(
        restarted.get_image("t2", "img-1").await.unwrap_err(),
        Error::NoImage
    ));
    assert_eq!(
        restarted.get_image("t1", "img-1").await.unwrap().visibility,
        Visibility::Private
    );
}

#[tokio::test]
async fn test_upsert_on_cold_index_replaces_stored_scope() {
    let (cache, meta, raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    // The replacement goes through a cache that has never seen the image.
    let restarted = ImageCache::new(raw, meta.clone());
    restarted
        .create_image(public_image("img-1", "t1"))
        .await
        .unwrap();

    let records = meta.get_all("t1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].visibility, Visibility::Public);
}

#[tokio::test]
async fn test_get_falls_back_to_metadata_store() {
    let (_cache, meta, raw, _tmp) = redb_cache();
    let img = private_image("img-1", "t1");
    meta.write(&img).await.unwrap();

    // A fresh cache over the same store has an empty index.
    let cache = ImageCache::new(raw, meta);
    assert_eq!(cache.get_image("t1", "img-1").await.unwrap(), img);
}

#[tokio::test]
async fn test_private_image_hidden_from_other_tenant() {
    let cache = ImageCache::memory();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let err = cache.get_image("t2", "img-1").await.unwrap_err();
    assert!(matches!(err, Error::NoImage));
}

// =============================================================================
// List
// =============================================================================

#[tokio::test]
async fn test_get_all_visibility_filter() {
    let (cache, _meta, _raw, _tmp) = redb_cache();
    cache.create_image(private_image("a-1", "a")).await.unwrap();
    cache.create_image(private_image("b-1", "b")).await.unwrap();
    cache.create_image(public_image("pub-1", "b")).await.unwrap();

    let mut for_a: Vec<String> = cache
        .get_all_images("a")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    for_a.sort();
    assert_eq!(for_a, vec!["a-1", "pub-1"]);

    let mut for_c: Vec<String> = cache
        .get_all_images("c")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    for_c.sort();
    assert_eq!(for_c, vec!["pub-1"]);
}

#[tokio::test]
async fn test_get_all_includes_store_only_records() {
    let (_cache, meta, raw, _tmp) = redb_cache();
    meta.write(&private_image("img-1", "t1")).await.unwrap();

    let cache = ImageCache::new(raw, meta);
    let images = cache.get_all_images("t1").await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, "img-1");
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_overwrites_record() {
    let (cache, meta, _raw, _tmp) = redb_cache();
    let img = private_image("img-1", "t1");
    cache.create_image(img.clone()).await.unwrap();

    let mut updated = img.clone();
    updated.name = "fixed-name".to_string();
    updated.tags = "golden".to_string();
    cache.update_image(updated).await.unwrap();

    let stored = meta.get("t1", "img-1").await.unwrap().unwrap();
    assert_eq!(stored.name, "fixed-name");
    assert_eq!(stored.tags, "golden");
    assert_eq!(cache.get_image("t1", "img-1").await.unwrap(), stored);
}

#[tokio::test]
async fn test_update_missing_image() {
    let cache = ImageCache::memory();
    let err = cache
        .update_image(private_image("missing", "t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoImage));
}

#[tokio::test]
async fn test_update_keeps_create_time() {
    let cache = ImageCache::memory();
    let img = private_image("img-1", "t1");
    cache.create_image(img.clone()).await.unwrap();

    let mut updated = img.clone();
    updated.create_time = img.create_time + chrono::Duration::days(1);
    cache.update_image(updated).await.unwrap();

    let stored = cache.get_image("t1", "img-1").await.unwrap();
    assert_eq!(stored.create_time, img.create_time);
}

#[tokio::test]
async fn test_update_moves_record_between_scopes() {
    let (cache, meta, _raw, _tmp) = redb_cache();
    let img = private_image("img-1", "t1");
    cache.create_image(img.clone()).await.unwrap();

    let mut published = img.clone();
    published.visibility = Visibility::Public;
    cache.update_image(published).await.unwrap();

    // Only the shared record remains, so other tenants see exactly one copy.
    assert_eq!(meta.get_all("t1").await.unwrap().len(), 1);
    assert!(meta.get("t2", "img-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_owner_on_cold_index() {
    let (cache, meta, raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let restarted = ImageCache::new(raw.clone(), meta.clone());
    restarted
        .update_image(private_image("img-1", "t2"))
        .await
        .unwrap();

    assert_eq!(meta.find("img-1").await.unwrap().unwrap().tenant_id, "t2");
    assert!(meta.get("t1", "img-1").await.unwrap().is_none());

    let fresh = ImageCache::new(raw, meta);
    assert!(fresh.get_image("t2", "img-1").await.is_ok());
    assert!(matches!(
        fresh.get_image("t1", "img-1").await.unwrap_err(),
        Error::NoImage
    ));
}

#[tokio::test]
async fn test_update_on_cold_index_keeps_create_time() {
    let (cache, meta, raw, _tmp) = redb_cache();
    let img = private_image("img-1", "t1");
    cache.create_image(img.clone()).await.unwrap();

    let restarted = ImageCache::new(raw, meta);
    let mut updated = img.clone();
    updated.name = "renamed".to_string();
    updated.create_time = img.create_time + chrono::Duration::hours(1);
    restarted.update_image(updated).await.unwrap();

    let stored = restarted.get_image("t1", "img-1").await.unwrap();
    assert_eq!(stored.name, "renamed");
    assert_eq!(stored.create_time, img.create_time);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_image() {
    let (cache, meta, _raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    cache.delete_image("t1", "img-1").await.unwrap();

    assert!(matches!(
        cache.get_image("t1", "img-1").await.unwrap_err(),
        Error::NoImage
    ));
    assert!(meta.get("t1", "img-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_authorization() {
    let (cache, meta, _raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-a", "a")).await.unwrap();
    cache.create_image(public_image("img-pub", "a")).await.unwrap();

    let err = cache.delete_image("b", "img-a").await.unwrap_err();
    assert!(matches!(err, Error::NoImage));
    assert!(cache.get_image("a", "img-a").await.is_ok());

    cache.delete_image("b", "img-pub").await.unwrap();
    assert!(meta.get("a", "img-pub").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_missing_image() {
    let cache = ImageCache::memory();
    let err = cache.delete_image("t1", "missing").await.unwrap_err();
    assert!(matches!(err, Error::NoImage));
}

#[tokio::test]
async fn test_delete_active_image_removes_blob() {
    let (cache, _meta, raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();
    cache
        .upload_image("t1", "img-1", &b"disk"[..])
        .await
        .unwrap();
    assert!(raw.contains("img-1"));

    cache.delete_image("t1", "img-1").await.unwrap();
    assert!(!raw.contains("img-1"));
}

#[tokio::test]
async fn test_delete_keeps_metadata_when_blob_delete_fails() {
    let tmp = TempDir::new().unwrap();
    let meta = RedbMetaStore::open(tmp.path().join("images.redb")).unwrap();
    let cache = ImageCache::new(UndeletableRawStore(MemoryRawStore::new()), meta.clone());

    cache.create_image(private_image("img-1", "t1")).await.unwrap();
    cache
        .upload_image("t1", "img-1", &b"disk"[..])
        .await
        .unwrap();

    let err = cache.delete_image("t1", "img-1").await.unwrap_err();
    assert!(matches!(err, Error::Io { .. }));

    assert!(cache.get_image("t1", "img-1").await.is_ok());
    assert!(meta.get("t1", "img-1").await.unwrap().is_some());
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_activates_image() {
    let (cache, meta, raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    cache
        .upload_image("t1", "img-1", &b"Upload file"[..])
        .await
        .unwrap();

    let img = cache.get_image("t1", "img-1").await.unwrap();
    assert_eq!(img.state, State::Active);
    assert_eq!(img.size, 11);
    assert_eq!(raw.blob("img-1").unwrap(), b"Upload file");

    let stored = meta.get("t1", "img-1").await.unwrap().unwrap();
    assert_eq!(stored.state, State::Active);
    assert_eq!(stored.size, 11);
}

#[tokio::test]
async fn test_upload_missing_image() {
    let cache = ImageCache::memory();
    let err = cache
        .upload_image("t1", "missing", &b"data"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoImage));
}

#[tokio::test]
async fn test_upload_to_other_tenants_private_image() {
    let cache = ImageCache::memory();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let err = cache
        .upload_image("t2", "img-1", &b"data"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoImage));
    assert_eq!(
        cache.get_image("t1", "img-1").await.unwrap().state,
        State::Created
    );
}

#[tokio::test]
async fn test_failed_upload_records_killed() {
    let (cache, meta, _raw, _tmp) = redb_cache();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let err = cache
        .upload_image("t1", "img-1", DisconnectingReader { sent: false })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));

    assert_eq!(
        cache.get_image("t1", "img-1").await.unwrap().state,
        State::Killed
    );
    let stored = meta.get("t1", "img-1").await.unwrap().unwrap();
    assert_eq!(stored.state, State::Killed);
    assert_eq!(stored.size, 0);
}

#[tokio::test]
async fn test_killed_image_can_be_uploaded_again() {
    let cache = ImageCache::memory();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let _ = cache
        .upload_image("t1", "img-1", DisconnectingReader { sent: false })
        .await;
    cache
        .upload_image("t1", "img-1", &b"second try"[..])
        .await
        .unwrap();

    let img = cache.get_image("t1", "img-1").await.unwrap();
    assert_eq!(img.state, State::Active);
    assert_eq!(img.size, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_upload_rejected() {
    let cache = ImageCache::memory();
    cache.create_image(private_image("img-1", "t1")).await.unwrap();

    let (mut client, server) = tokio::io::duplex(1024);
    let uploader = cache.clone();
    let first =
        tokio::spawn(async move { uploader.upload_image("t1", "img-1", server).await });

    wait_for_state(&cache, "t1", "img-1", State::Saving).await;

    let err = cache
        .upload_image("t1", "img-1", &b"racing upload"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ImageSaving));

    client.write_all(b"first upload").await.unwrap();
    drop(client);
    first.await.unwrap().unwrap();

    let img = cache.get_image("t1", "img-1").await.unwrap();
    assert_eq!(img.state, State::Active);
    assert_eq!(img.size, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reads_not_blocked_by_upload() {
    let cache = ImageCache::memory();
    cache.create_image(private_image("slow", "t1")).await.unwrap();
    cache.create_image(private_image("other", "t1")).await.unwrap();

    let (mut client, server) = tokio::io::duplex(64);
    let uploader = cache.clone();
    let upload = tokio::spawn(async move { uploader.upload_image("t1", "slow", server).await });

    wait_for_state(&cache, "t1", "slow", State::Saving).await;

    // The transfer is stalled on the client; reads must still complete.
    let other = tokio::time::timeout(Duration::from_secs(1), cache.get_image("t1", "other"))
        .await
        .expect("get_image blocked by upload")
        .unwrap();
    assert_eq!(other.state, State::Created);

    let all = tokio::time::timeout(Duration::from_secs(1), cache.get_all_images("t1"))
        .await
        .expect("get_all_images blocked by upload")
        .unwrap();
    assert_eq!(all.len(), 2);

    client.write_all(&[7_u8; 4096]).await.unwrap();
    drop(client);
    upload.await.unwrap().unwrap();

    assert_eq!(cache.get_image("t1", "slow").await.unwrap().size, 4096);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_and_update_rejected_while_saving() {
    let cache = ImageCache::memory();
    let img = private_image("img-1", "t1");
    cache.create_image(img.clone()).await.unwrap();

    let (client, server) = tokio::io::duplex(64);
    let uploader = cache.clone();
    let upload = tokio::spawn(async move { uploader.upload_image("t1", "img-1", server).await });

    wait_for_state(&cache, "t1", "img-1", State::Saving).await;

    let err = cache.delete_image("t1", "img-1").await.unwrap_err();
    assert!(matches!(err, Error::ImageSaving));
    let err = cache.update_image(img.clone()).await.unwrap_err();
    assert!(matches!(err, Error::ImageSaving));
    let err = cache.create_image(img).await.unwrap_err();
    assert!(matches!(err, Error::ImageSaving));

    drop(client);
    upload.await.unwrap().unwrap();
    assert_eq!(
        cache.get_image("t1", "img-1").await.unwrap().state,
        State::Active
    );
}
