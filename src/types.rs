//! Shared helpers: clocks and tip id validation.

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TipError;

/// Milliseconds since the Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Current UTC time for record timestamps.
#[inline]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Reject ids that cannot identify a tip.
pub fn validate_tip_id(id: &str) -> Result<(), TipError> {
    if id.trim().is_empty() {
        return Err(TipError::InvalidTipId(id.to_string()));
    }
    Ok(())
}
