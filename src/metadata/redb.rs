//! Redb-backed image metadata backend.
//!
//! Stores CBOR-encoded [`Image`] records in a single `images` table keyed
//! by `(scope, id)`.

use super::backend::MetaDataStore;
use crate::error::{Error, Result, db_err};
use crate::image::{Image, PUBLIC_SCOPE};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Table of image records keyed by `(scope, image id)`.
pub(crate) const IMAGES_TABLE: TableDefinition<
    'static,
    (&'static str, &'static str),
    &'static [u8],
> = TableDefinition::new("images");

/// Redb-backed metadata backend.
///
/// The database handle is opened once and shared; every operation runs in
/// its own read or write transaction, so a record is either fully written
/// or not visible at all.
///
/// # Thread Safety
///
/// `RedbMetaStore` is `Clone` and can be shared across threads. The underlying
/// database handles concurrent access safely.
#[derive(Clone)]
pub struct RedbMetaStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbMetaStore {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates parent directories if needed and makes sure the `images`
    /// table exists so reads never fail on a fresh database.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, disk full, etc.)
    /// - Initialization transaction fails to begin or commit
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(
                    format!("creating metadata directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let db = Database::create(path).map_err(|e| {
            Error::database(format!("opening metadata database {}", path.display()), e)
        })?;

        let write_txn = db
            .begin_write()
            .map_err(db_err("beginning initialization transaction"))?;
        {
            let _table = write_txn
                .open_table(IMAGES_TABLE)
                .map_err(db_err("initializing images table"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("committing initialization transaction"))?;

        tracing::debug!(path = %path.display(), "Opened image metadata database");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_sync(&self, image: &Image) -> Result<()> {
        let record = encode(image)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("beginning write transaction"))?;
        {
            let mut table = write_txn
                .open_table(IMAGES_TABLE)
                .map_err(db_err("opening images table"))?;

            table
                .insert((image.scope(), image.id.as_str()), record.as_slice())
                .map_err(db_err("inserting image record"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("committing write transaction"))?;

        Ok(())
    }

    fn delete_sync(&self, scope: &str, id: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("beginning write transaction"))?;
        {
            let mut table = write_txn
                .open_table(IMAGES_TABLE)
                .map_err(db_err("opening images table"))?;

            table
                .remove((scope, id))
                .map_err(db_err("removing image record"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("committing delete transaction"))?;

        Ok(())
    }

    fn get_sync(&self, tenant: &str, id: &str) -> Result<Option<Image>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("beginning read transaction"))?;
        let table = read_txn
            .open_table(IMAGES_TABLE)
            .map_err(db_err("opening images table"))?;

        for scope in [tenant, PUBLIC_SCOPE] {
            let found = table
                .get((scope, id))
                .map_err(db_err("reading image record"))?;
            if let Some(guard) = found {
                return decode(scope, id, guard.value()).map(Some);
            }
        }

        Ok(None)
    }

    fn find_sync(&self, id: &str) -> Result<Option<Image>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("beginning read transaction"))?;
        let table = read_txn
            .open_table(IMAGES_TABLE)
            .map_err(db_err("opening images table"))?;

        for item in table.iter().map_err(db_err("iterating images table"))? {
            let (key, value) = item.map_err(db_err("reading image entry"))?;
            let (scope, key_id) = key.value();

            if key_id == id {
                return decode(scope, id, value.value()).map(Some);
            }
        }

        Ok(None)
    }

    fn get_all_sync(&self, tenant: &str) -> Result<Vec<Image>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("beginning read transaction"))?;
        let table = read_txn
            .open_table(IMAGES_TABLE)
            .map_err(db_err("opening images table"))?;

        let mut images = Vec::new();

        for item in table.iter().map_err(db_err("iterating images table"))? {
            let (key, value) = item.map_err(db_err("reading image entry"))?;
            let (scope, id) = key.value();

            if scope != tenant && scope != PUBLIC_SCOPE {
                continue;
            }

            // A corrupted record only hides itself.
            match decode(scope, id, value.value()) {
                Ok(image) => images.push(image),
                Err(err) => tracing::warn!(error = %err, "Skipping undecodable image record"),
            }
        }

        Ok(images)
    }
}

#[cfg(test)]
impl RedbMetaStore {
    /// Stores raw bytes under `(scope, id)`, bypassing encoding.
    pub(crate) fn insert_raw(&self, scope: &str, id: &str, bytes: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("beginning write transaction"))?;
        {
            let mut table = write_txn
                .open_table(IMAGES_TABLE)
                .map_err(db_err("opening images table"))?;
            table
                .insert((scope, id), bytes)
                .map_err(db_err("inserting raw record"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("committing write transaction"))
    }
}

#[async_trait]
impl MetaDataStore for RedbMetaStore {
    async fn write(&self, image: &Image) -> Result<()> {
        let store = self.clone();
        let image = image.clone();
        tokio::task::spawn_blocking(move || store.write_sync(&image)).await?
    }

    async fn delete(&self, scope: &str, id: &str) -> Result<()> {
        let store = self.clone();
        let scope = scope.to_string();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || store.delete_sync(&scope, &id)).await?
    }

    async fn get(&self, tenant: &str, id: &str) -> Result<Option<Image>> {
        let store = self.clone();
        let tenant = tenant.to_string();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || store.get_sync(&tenant, &id)).await?
    }

    async fn find(&self, id: &str) -> Result<Option<Image>> {
        let store = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || store.find_sync(&id)).await?
    }

    async fn get_all(&self, tenant: &str) -> Result<Vec<Image>> {
        let store = self.clone();
        let tenant = tenant.to_string();
        tokio::task::spawn_blocking(move || store.get_all_sync(&tenant)).await?
    }
}

/// Serializes an image record as CBOR.
pub(crate) fn encode(image: &Image) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(image, &mut out).map_err(|err| Error::Encode {
        id: image.id.clone(),
        reason: err.to_string(),
    })?;
    Ok(out)
}

/// Deserializes a CBOR image record stored under `(scope, id)`.
pub(crate) fn decode(scope: &str, id: &str, data: &[u8]) -> Result<Image> {
    ciborium::de::from_reader(data).map_err(|err| Error::Decode {
        key: record_key(scope, id),
        reason: err.to_string(),
    })
}

fn record_key(scope: &str, id: &str) -> String {
    if scope == PUBLIC_SCOPE {
        format!("<public>/{id}")
    } else {
        format!("{scope}/{id}")
    }
}
