//! Key-value store interface and implementations.
//!
//! Provides a trait-based KV store interface with an in-memory implementation
//! for tests and a redb-based implementation for persistence. The [`KVExt`]
//! extension adds Redis-style counters, hashes and sets on top of the raw
//! byte operations.

pub mod ext;
pub mod memory;
pub mod redb;

use std::fmt;
use thiserror::Error;

/// Errors that can occur in KV store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: not found")]
    NotFound,

    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: serialization error: {0}")]
    Serialization(String),
}

/// Result type for KV operations.
pub type KVResult<T> = Result<T, KVError>;

/// Read-modify-write callback used by [`KVStore::update`].
///
/// Receives the current value (if any) and returns the value to store.
/// Returning `None` deletes the key.
pub type UpdateFn<'a> = dyn FnMut(Option<&[u8]>) -> KVResult<Option<Vec<u8>>> + 'a;

/// Key-value store trait.
///
/// String keys, byte values. Every method is a single unit of work against
/// the backing store: either it is applied completely or it returns an error.
pub trait KVStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Set a key-value pair.
    fn set(&self, key: &str, value: &[u8]) -> KVResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> KVResult<()>;

    /// Scan for keys with a given prefix, sorted by key.
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;

    /// Batch set multiple key-value pairs.
    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()>;

    /// Batch delete multiple keys.
    fn batch_delete(&self, keys: &[&str]) -> KVResult<()>;

    /// Atomically read, transform and write back a single key.
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> KVResult<()>;
}

impl fmt::Debug for dyn KVStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KVStore {{ ... }}")
    }
}

/// A boxed KV store for use in trait objects.
pub type BoxedKVStore = Box<dyn KVStore>;

// Re-export the implementations
pub use ext::KVExt;
pub use memory::MemoryStore;
pub use redb::RedbStore;
