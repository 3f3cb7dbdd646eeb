//! Configuration for the ciao-image service.
//!
//! Settings are read from a TOML file with three sections:
//!
//! - `[metadata]` - where image records are stored ([`MetadataConfig`])
//! - `[raw]` - where image content is stored ([`RawConfig`])
//! - `[logging]` - log level and format ([`LoggingConfig`])
//!
//! Every field has a default, so an empty or missing file yields a working
//! setup under the home directory (see [`crate::paths`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::cache::ImageCache;
use crate::metadata::{MetaDataStore, NoopMetaStore, RedbMetaStore};
use crate::paths;
use crate::raw::{FilesystemRawStore, MemoryRawStore, RawDataStore};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub metadata: MetadataConfig,
    pub raw: RawConfig,
    pub logging: LoggingConfig,
}

/// Metadata backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    /// Durable records in a redb database file.
    #[default]
    Redb,
    /// Records live only in the cache's memory.
    Noop,
}

impl fmt::Display for MetadataBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => write!(f, "redb"),
            Self::Noop => write!(f, "noop"),
        }
    }
}

/// `[metadata]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    /// Database file; defaults to `<home>/ciao-image.redb`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Raw data backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawBackend {
    /// One file per image under a mount point.
    #[default]
    Filesystem,
    /// Content kept in process memory.
    Memory,
}

impl fmt::Display for RawBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// `[raw]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub backend: RawBackend,
    /// Directory holding image files; defaults to `<home>/images`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the usual locations.
    ///
    /// Looks for `ciao-image.toml` in the current directory, then
    /// `<home>/config.toml`. Falls back to defaults when neither exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let local = Path::new(paths::LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Self::load_from(local);
        }

        let home = paths::get_config_path()?;
        if home.is_file() {
            return Self::load_from(&home);
        }

        Ok(Self::default())
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an unknown name or invalid value
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - An explicitly empty database path or mount point
    /// - A log level that is not a valid filter directive
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.metadata.backend == MetadataBackend::Redb
            && self
                .metadata
                .path
                .as_ref()
                .is_some_and(|p| p.as_os_str().is_empty())
        {
            errors.push("metadata.path cannot be empty for the redb backend".to_string());
        }

        if self.raw.backend == RawBackend::Filesystem
            && self
                .raw
                .mount_point
                .as_ref()
                .is_some_and(|p| p.as_os_str().is_empty())
        {
            errors.push("raw.mount_point cannot be empty for the filesystem backend".to_string());
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            errors.push(format!(
                "Invalid logging.level '{}': {e}\n  \
                 Examples: info, debug, ciao_image=trace",
                self.logging.level
            ));
        }

        match (self.metadata.backend, self.raw.backend) {
            (MetadataBackend::Noop, RawBackend::Filesystem) => warnings.push(
                "Image records are not persisted (metadata.backend = \"noop\")\n  \
                 Uploaded files will be orphaned on restart"
                    .to_string(),
            ),
            (MetadataBackend::Redb, RawBackend::Memory) => warnings.push(
                "Image content is kept in memory (raw.backend = \"memory\")\n  \
                 Active images will have no content after a restart"
                    .to_string(),
            ),
            _ => {},
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }

    /// Database file used by the redb backend.
    pub fn metadata_path(&self) -> Result<PathBuf> {
        match &self.metadata.path {
            Some(path) => Ok(path.clone()),
            None => paths::get_metadata_path(),
        }
    }

    /// Directory used by the filesystem backend.
    pub fn mount_point(&self) -> Result<PathBuf> {
        match &self.raw.mount_point {
            Some(path) => Ok(path.clone()),
            None => paths::get_images_dir(),
        }
    }

    /// Open the configured backends and build an [`ImageCache`] over them.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or mount point cannot be opened.
    pub fn open_cache(&self) -> Result<ImageCache> {
        let meta: Arc<dyn MetaDataStore> = match self.metadata.backend {
            MetadataBackend::Redb => {
                let path = self.metadata_path()?;
                let store = RedbMetaStore::open(&path).with_context(|| {
                    format!("Failed to open metadata database: {}", path.display())
                })?;
                tracing::info!(path = %store.path().display(), "Using redb image metadata");
                Arc::new(store)
            },
            MetadataBackend::Noop => Arc::new(NoopMetaStore::new()),
        };

        let raw: Arc<dyn RawDataStore> = match self.raw.backend {
            RawBackend::Filesystem => {
                let mount_point = self.mount_point()?;
                let store = FilesystemRawStore::open(&mount_point).with_context(|| {
                    format!("Failed to open image mount point: {}", mount_point.display())
                })?;
                Arc::new(store)
            },
            RawBackend::Memory => Arc::new(MemoryRawStore::new()),
        };

        tracing::debug!(
            metadata = %self.metadata.backend,
            raw = %self.raw.backend,
            "Opened image cache backends"
        );

        Ok(ImageCache::with_backends(raw, meta))
    }
}
