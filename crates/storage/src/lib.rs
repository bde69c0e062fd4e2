//! Storage abstraction and implementations for trainpath.
//!
//! This crate provides the catalog and progress store traits the unlocking
//! engine reads through, with in-memory and JSON file implementations and an
//! optional SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{
    Catalog, ChangeFeed, ModuleCatalog, PathProgressStore, ProgressChange, ProgressStore,
    ProgressSubscription, Result, StorageError,
};
pub use memory::MemoryStorage;
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
