//! Storage layer
//!
//! Local durable state for the sync engine, exposed through the
//! [`KeyValueStore`] port.

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{keys, FileStore, KeyValueStore, MemoryStore};
