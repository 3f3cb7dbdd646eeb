//! Image record types.
//!
//! [`Image`] is the only entity the cache manages. Its [`State`] drives the
//! upload lifecycle and its [`Visibility`] plus `tenant_id` decide who may
//! see or delete it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metadata scope shared by all public images.
///
/// Public records are keyed under this pseudo-tenant instead of the
/// uploader's tenant. A real tenant ID is never empty, so it cannot collide.
pub const PUBLIC_SCOPE: &str = "";

/// Lifecycle state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Metadata exists, no bytes uploaded yet.
    #[default]
    Created,
    /// An upload is in progress.
    Saving,
    /// Bytes are stored and usable.
    Active,
    /// The last upload failed.
    Killed,
    /// Deleted (tombstone).
    Deleted,
    /// Scheduled for deletion (tombstone).
    PendingDelete,
}

impl State {
    /// Translates the lifecycle state to the OpenStack image status.
    pub fn status(self) -> ImageStatus {
        match self {
            Self::Created => ImageStatus::Queued,
            Self::Saving => ImageStatus::Saving,
            Self::Active => ImageStatus::Active,
            Self::Killed => ImageStatus::Killed,
            Self::Deleted => ImageStatus::Deleted,
            Self::PendingDelete => ImageStatus::PendingDelete,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Saving => "saving",
            Self::Active => "active",
            Self::Killed => "killed",
            Self::Deleted => "deleted",
            Self::PendingDelete => "pending_delete",
        };
        f.write_str(s)
    }
}

/// OpenStack image status as reported by the image API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Queued,
    Saving,
    Active,
    Killed,
    Deleted,
    PendingDelete,
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Saving => "saving",
            Self::Active => "active",
            Self::Killed => "killed",
            Self::Deleted => "deleted",
            Self::PendingDelete => "pending_delete",
        })
    }
}

/// Access scope of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Usable by every tenant.
    Public,
    /// Usable only by the owning tenant.
    #[default]
    Private,
    /// Reserved for the cluster itself.
    Internal,
}

impl Visibility {
    /// Public and internal images may only be created by privileged callers.
    pub fn requires_privilege(self) -> bool {
        !matches!(self, Self::Private)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Internal => "internal",
        })
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "internal" => Ok(Self::Internal),
            other => Err(format!(
                "unknown visibility '{other}' (expected public, private or internal)"
            )),
        }
    }
}

/// On-disk format of the image content. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Raw,
    Qcow2,
    Iso,
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::Qcow2 => "qcow2",
            Self::Iso => "iso",
        })
    }
}

impl FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "qcow2" | "qcow" => Ok(Self::Qcow2),
            "iso" => Ok(Self::Iso),
            other => Err(format!(
                "unknown image type '{other}' (expected raw, qcow2 or iso)"
            )),
        }
    }
}

/// Everything the cluster stores about a disk image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub state: State,
    /// Owning tenant. Empty means the image belongs to the whole cluster.
    pub tenant_id: String,
    pub visibility: Visibility,
    pub name: String,
    pub create_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub image_type: ImageType,
    /// Length of the stored content in bytes, 0 until an upload completes.
    pub size: u64,
    pub tags: String,
}

impl Image {
    /// Creates a queued image owned by `tenant_id`, stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            id: id.into(),
            state: State::Created,
            tenant_id: tenant_id.into(),
            visibility,
            name: name.into(),
            create_time: Utc::now(),
            image_type: ImageType::default(),
            size: 0,
            tags: String::new(),
        }
    }

    /// Returns true if every tenant may use this image.
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public || self.tenant_id.is_empty()
    }

    /// Metadata scope the record is stored under.
    pub fn scope(&self) -> &str {
        if self.is_public() {
            PUBLIC_SCOPE
        } else {
            &self.tenant_id
        }
    }

    /// Returns true if `tenant` may read, upload to, or delete this image.
    pub fn visible_to(&self, tenant: &str) -> bool {
        self.is_public() || self.tenant_id == tenant
    }
}
