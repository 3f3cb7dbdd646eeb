//! Path utilities for ciao-image data.
//!
//! # Base Directory
//! - [`get_home_dir`] - `~/.ciao-image/` (base directory for all data)
//!
//! # Default Locations
//! - [`get_config_path`] - `~/.ciao-image/config.toml` (configuration)
//! - [`get_metadata_path`] - `~/.ciao-image/ciao-image.redb` (image records)
//! - [`get_images_dir`] - `~/.ciao-image/images/` (image content)

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "CIAO_IMAGE_HOME";

/// Configuration file looked up in the current directory before the home one.
pub const LOCAL_CONFIG_FILE: &str = "ciao-image.toml";

/// Get the ciao-image base directory.
///
/// Resolution order:
/// 1. `CIAO_IMAGE_HOME` environment variable (if set)
/// 2. `~/.ciao-image/` (default)
pub fn get_home_dir() -> Result<PathBuf> {
    resolve_home_dir(std::env::var_os(HOME_ENV))
}

fn resolve_home_dir(override_dir: Option<OsString>) -> Result<PathBuf> {
    if let Some(dir) = override_dir
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".ciao-image"))
}

/// Get the config file path: `~/.ciao-image/config.toml`
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("config.toml"))
}

/// Get the metadata database path: `~/.ciao-image/ciao-image.redb`
pub fn get_metadata_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("ciao-image.redb"))
}

/// Get the image content directory: `~/.ciao-image/images/`
pub fn get_images_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("images"))
}
