//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{MemoryStore, SqliteStore, TipStore};

/// Environment variable overriding the SQLite database path.
pub const STORE_PATH_ENV: &str = "TIPKIT_STORE_PATH";

/// Default namespace; every tip id lives inside one namespace.
pub const DEFAULT_NAMESPACE: &str = "tipkit";

/// Where tip records are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    /// Non-durable, per-process storage.
    Memory,
    /// SQLite database file.
    Sqlite { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: PathBuf::from("./var/data/tipkit.db"),
        }
    }
}

/// Configuration for [`TipKit`](crate::TipKit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipKitConfig {
    /// Storage backend
    pub store: StoreConfig,
    /// Namespace isolating this engine's tips inside a shared store
    pub namespace: String,
}

impl Default for TipKitConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl TipKitConfig {
    /// In-memory configuration, used by tests and previews.
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig::Memory,
            ..Self::default()
        }
    }

    /// Defaults with the SQLite path taken from `TIPKIT_STORE_PATH` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = std::env::var_os(STORE_PATH_ENV).filter(|p| !p.is_empty()) {
            config.store = StoreConfig::Sqlite {
                path: PathBuf::from(path),
            };
        }
        config
    }

    /// Build the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn TipStore>, StoreError> {
        let store: Arc<dyn TipStore> = match &self.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::Sqlite { path } => Arc::new(SqliteStore::open(path, &self.namespace)?),
        };
        Ok(store)
    }
}
