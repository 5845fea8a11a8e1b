//! Error types for the tip engine and its stores.

use thiserror::Error;

/// Faults raised by a [`TipStore`](crate::store::TipStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`TipKit`](crate::TipKit) operations.
///
/// Operations on tips that were never registered are not errors; they return
/// `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum TipError {
    /// The caller passed an empty or whitespace-only tip id.
    #[error("tip id must be a non-empty string (got {0:?})")]
    InvalidTipId(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stored value for `id` is not a decodable tip record.
    #[error("failed to decode tip record '{id}': {source}")]
    Codec {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The engine was requested without an installed [`TipKitProvider`](crate::TipKitProvider).
    #[error("use_tip_kit must be called within a TipKitProvider scope")]
    NoProvider,
}

pub type TipResult<T> = Result<T, TipError>;
