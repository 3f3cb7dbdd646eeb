//! Image content storage with pluggable backends.
//!
//! A raw data store holds the binary content ("blob") of each image,
//! addressed by image ID. It knows nothing about tenants or states; the
//! cache decides when blobs are written and removed.
//!
//! - **FilesystemRawStore**: One file per image under a mount point (default)
//! - **MemoryRawStore**: Blobs held in memory (testing/ephemeral)

mod backend;
mod filesystem;
mod memory;

pub use backend::{ImageReader, RawDataStore};
pub use filesystem::FilesystemRawStore;
pub use memory::MemoryRawStore;
