//! Input validation for image records.
//!
//! Image IDs double as blob file names in the filesystem backend, so an ID
//! must be a single plain path component. Names follow the character set
//! accepted by the image API.

use crate::error::{Error, Result};
use std::path::{Component, Path};

/// Maximum length of an image name.
pub const MAX_NAME_LEN: usize = 64;

/// Validates an image ID for use as a storage key and blob file name.
///
/// # Security
/// Rejects IDs that:
/// - Are empty
/// - Contain path separators or NUL bytes
/// - Are `.` or `..`
/// - Would be interpreted as a root or drive prefix
///
/// # Examples
/// ```
/// use ciao_image::validation::validate_image_id;
///
/// assert!(validate_image_id("b2173dd3-7ad6-4362-baa6-a68bce3565cb").is_ok());
/// assert!(validate_image_id("../etc/passwd").is_err());
/// assert!(validate_image_id("").is_err());
/// ```
pub fn validate_image_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::invalid_image("image ID cannot be empty"));
    }

    if id.contains(['/', '\\', '\0']) {
        return Err(Error::invalid_image(format!(
            "image ID cannot contain path separators: {id:?}"
        )));
    }

    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::CurDir | Component::ParentDir), _) => Err(Error::invalid_image(format!(
            "image ID cannot be a relative path component: {id:?}"
        ))),
        _ => Err(Error::invalid_image(format!(
            "image ID must be a plain file name: {id:?}"
        ))),
    }
}

/// Validates an image name against `^[a-z0-9-.]{1,64}$`.
pub fn validate_image_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_image(format!(
            "image name must be 1-{MAX_NAME_LEN} characters: {name:?}"
        )));
    }

    let valid = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    if !valid {
        return Err(Error::invalid_image(format!(
            "image name may only contain [a-z0-9-.]: {name:?}"
        )));
    }

    Ok(())
}
