//! Key-value storage for serialized tip records.
//!
//! The engine only needs synchronous get/set/contains/delete/keys/clear
//! semantics over string keys and string values. Two backends ship:
//! - **Memory**: `HashMap` behind a lock, for tests and ephemeral sessions
//! - **SQLite**: one table in a local database file, durable across restarts
//!
//! Each store is a namespace: every tip id maps to exactly one value.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;

/// Durable, process-wide mapping from tip id to serialized record.
///
/// Implementations must be safe to share behind an `Arc` across the
/// components that render tips.
pub trait TipStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove `key`. Returns whether a value was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys currently present, in unspecified order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remove every key.
    fn clear_all(&self) -> Result<(), StoreError>;
}
