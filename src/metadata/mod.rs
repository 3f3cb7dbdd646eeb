//! Image metadata storage with pluggable backends.
//!
//! The metadata store is the durable source of truth for image records.
//! Records are scoped by tenant; public images live under the shared
//! [`PUBLIC_SCOPE`](crate::image::PUBLIC_SCOPE) so every tenant can find them.
//!
//! - **RedbMetaStore**: Persistent storage with ACID guarantees (default)
//! - **NoopMetaStore**: Accepts every call and stores nothing (testing/ephemeral)
//!
//! # Custom Backends
//!
//! Implement the `MetaDataStore` trait to use custom storage:
//!
//! ```ignore
//! use ciao_image::metadata::MetaDataStore;
//!
//! struct EtcdMetaStore { /* ... */ }
//! impl MetaDataStore for EtcdMetaStore { /* ... */ }
//! ```

mod backend;
mod noop;
mod redb;


pub use backend::MetaDataStore;
pub use noop::NoopMetaStore;
pub use self::redb::RedbMetaStore;
