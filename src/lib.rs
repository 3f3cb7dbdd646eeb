//! Image metadata and content cache for the ciao cluster orchestrator.
//!
//! [`ImageCache`] is the single entry point. It pairs a [`metadata`] backend
//! (durable image records, scoped by tenant) with a [`raw`] backend (image
//! content addressed by ID), enforces tenant visibility, and drives the
//! upload lifecycle without holding its lock during content transfer.
//!
//! ```ignore
//! use ciao_image::{Image, ImageCache, Visibility};
//!
//! let cache = ImageCache::memory();
//! cache.create_image(Image::new("img-1", "t1", "cirros", Visibility::Private)).await?;
//! cache.upload_image("t1", "img-1", tokio::fs::File::open("cirros.img").await?).await?;
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod image;
pub mod metadata;
pub mod paths;
pub mod raw;
pub mod validation;

pub use cache::ImageCache;
pub use config::Config;
pub use error::{Error, Result};
pub use image::{Image, ImageStatus, ImageType, PUBLIC_SCOPE, State, Visibility};
