//! Persisted tip record schema.
//!
//! One [`TipRecord`] is stored per tip id, serialized as a JSON object. The
//! field names match the records written by earlier releases so an existing
//! installation keeps its display history:
//!
//! ```json
//! {
//!   "schemaVersion": 2,
//!   "id": "create-new-palette",
//!   "status": "available",
//!   "shouldDisplay": true,
//!   "created_at": "2024-05-01T09:30:00Z",
//!   "updated_at": "2024-05-01T09:30:00Z",
//!   "options": { "maxDisplayCount": { "value": 3, "count": 0 } },
//!   "rule": { "ruleName": "has-palettes" }
//! }
//! ```
//!
//! Records without `schemaVersion` are version 1. Decoding is lenient: every
//! field is optional on read and gets normalized into a record that satisfies
//! the invariants below.
//!
//! # Invariants
//! - `status == Invalidated` implies `should_display == false`
//! - `invalidation_reason` is `Some` only while `status == Invalidated`

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Schema version assumed for records that carry no version field.
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

// ================================================================================================
// ENUMS
// ================================================================================================

/// Display eligibility of a tip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipStatus {
    /// Eligible for display, subject to the display-count check.
    #[default]
    Available,
    /// A rule currently evaluates false. Recoverable.
    Pending,
    /// Retired until an explicit reset.
    Invalidated,
}

impl TipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipStatus::Available => "available",
            TipStatus::Pending => "pending",
            TipStatus::Invalidated => "invalidated",
        }
    }
}

impl std::fmt::Display for TipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why a tip was invalidated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidationReason {
    /// The user performed the action the tip describes.
    ActionPerformed,
    /// The tip exceeded its maximum display count.
    DisplayCountExceeded,
    /// The tip exceeded its maximum display duration.
    DisplayDurationExceeded,
    /// The user explicitly closed the tip while it was displaying.
    TipClosed,
}

impl InvalidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::ActionPerformed => "actionPerformed",
            InvalidationReason::DisplayCountExceeded => "displayCountExceeded",
            InvalidationReason::DisplayDurationExceeded => "displayDurationExceeded",
            InvalidationReason::TipClosed => "tipClosed",
        }
    }
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for InvalidationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actionPerformed" | "action-performed" => Ok(InvalidationReason::ActionPerformed),
            "displayCountExceeded" | "display-count-exceeded" => {
                Ok(InvalidationReason::DisplayCountExceeded)
            }
            "displayDurationExceeded" | "display-duration-exceeded" => {
                Ok(InvalidationReason::DisplayDurationExceeded)
            }
            "tipClosed" | "tip-closed" => Ok(InvalidationReason::TipClosed),
            other => Err(format!("unknown invalidation reason '{}'", other)),
        }
    }
}

// ================================================================================================
// RECORD
// ================================================================================================

/// Caller-supplied registration options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TipOptions {
    /// How many impressions the tip may receive before it is invalidated.
    pub max_display_count: u32,
}

impl TipOptions {
    pub fn new(max_display_count: u32) -> Self {
        Self { max_display_count }
    }
}

/// Configured cap and impressions recorded so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCount {
    pub value: u32,
    pub count: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOptions {
    pub max_display_count: DisplayCount,
}

/// Persisted identity of a rule. The predicate itself is never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleIdentity {
    pub rule_name: String,
}

impl RuleIdentity {
    pub fn new(rule_name: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
        }
    }
}

/// The persisted state of one tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipRecord {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub id: String,
    pub status: TipStatus,
    /// The flag the presentation layer reads to decide whether to render now.
    #[serde(rename = "shouldDisplay")]
    pub should_display: bool,
    #[serde(rename = "invalidationReason", skip_serializing_if = "Option::is_none")]
    pub invalidation_reason: Option<InvalidationReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub options: RecordOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleIdentity>,
}

impl TipRecord {
    /// Create a fresh, displayable record.
    pub fn new(
        id: impl Into<String>,
        options: TipOptions,
        rule: Option<RuleIdentity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            status: TipStatus::Available,
            should_display: true,
            invalidation_reason: None,
            created_at: now,
            updated_at: now,
            options: RecordOptions {
                max_display_count: DisplayCount {
                    value: options.max_display_count,
                    count: 0,
                },
            },
            rule,
        }
    }

    /// Configured impression cap.
    #[inline]
    pub fn max_display_count(&self) -> u32 {
        self.options.max_display_count.value
    }

    /// Impressions recorded since creation or the last reset.
    #[inline]
    pub fn display_count(&self) -> u32 {
        self.options.max_display_count.count
    }

    pub fn rule_name(&self) -> Option<&str> {
        self.rule.as_ref().map(|r| r.rule_name.as_str())
    }

    #[inline]
    pub fn is_invalidated(&self) -> bool {
        self.status == TipStatus::Invalidated
    }

    /// `should_display` and not held back by a pending rule.
    pub fn is_eligible(&self) -> bool {
        self.should_display && self.status == TipStatus::Available
    }

    // ============================================================================================
    // TRANSITIONS
    // ============================================================================================

    /// Count one impression. Returns true when this impression pushed the
    /// count past the cap, in which case the record is now invalidated.
    pub(crate) fn apply_impression(&mut self, now: DateTime<Utc>) -> bool {
        let counter = &mut self.options.max_display_count;
        counter.count = counter.count.saturating_add(1);
        self.should_display = counter.count <= counter.value;
        self.updated_at = now;

        if !self.should_display {
            self.apply_invalidation(InvalidationReason::DisplayCountExceeded, now);
            return true;
        }
        false
    }

    /// Replace the cap, keeping the count. Returns true when the count is
    /// already past the new cap, in which case the record is now invalidated.
    pub(crate) fn apply_cap(&mut self, value: u32, now: DateTime<Utc>) -> bool {
        self.options.max_display_count.value = value;
        self.updated_at = now;

        let counter = &self.options.max_display_count;
        if self.is_invalidated() || counter.count <= counter.value {
            return false;
        }
        self.apply_invalidation(InvalidationReason::DisplayCountExceeded, now);
        true
    }

    pub(crate) fn apply_invalidation(&mut self, reason: InvalidationReason, now: DateTime<Utc>) {
        self.status = TipStatus::Invalidated;
        self.should_display = false;
        self.invalidation_reason = Some(reason);
        self.updated_at = now;
    }

    /// Back to a fresh state, keeping the configured cap and rule identity.
    pub(crate) fn apply_reset(&mut self, now: DateTime<Utc>) {
        self.status = TipStatus::Available;
        self.should_display = true;
        self.invalidation_reason = None;
        self.options.max_display_count.count = 0;
        self.schema_version = SCHEMA_VERSION;
        self.updated_at = now;
    }

    // ============================================================================================
    // CODEC
    // ============================================================================================

    /// Serialize to the stored JSON form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored value, normalizing records written by earlier schema
    /// versions or with missing fields.
    ///
    /// `key` is the store key the value was read from; it wins over a
    /// missing or mismatched `id` field.
    pub fn decode(key: &str, raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected a tip record object, found {}",
                json_kind(&value)
            )));
        }
        let stored: StoredTip = serde_json::from_value(value)?;
        Ok(stored.normalize(key, Utc::now()))
    }
}

// ================================================================================================
// LENIENT DECODING
// ================================================================================================

/// Shape accepted on read. Every field is optional and loosely typed.
#[derive(Debug, Deserialize)]
struct StoredTip {
    #[serde(rename = "schemaVersion", default)]
    schema_version: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(rename = "shouldDisplay", default)]
    should_display: Option<bool>,
    #[serde(rename = "invalidationReason", default)]
    invalidation_reason: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    rule: Option<Value>,
}

impl StoredTip {
    fn normalize(self, key: &str, now: DateTime<Utc>) -> TipRecord {
        let mut repaired = Vec::new();

        let version = self.schema_version.unwrap_or(LEGACY_SCHEMA_VERSION);

        if self.id.as_deref() != Some(key) {
            repaired.push("id");
        }

        let reason = self
            .invalidation_reason
            .as_ref()
            .and_then(parse_enum::<InvalidationReason>);

        // A retired tip must stay retired even if its status is unreadable
        let status = match self.status.as_ref().map(parse_enum::<TipStatus>) {
            Some(Some(status)) => status,
            _ if reason.is_some() => {
                repaired.push("status");
                TipStatus::Invalidated
            }
            _ => {
                repaired.push("status");
                TipStatus::Available
            }
        };

        let options = self
            .options
            .as_ref()
            .and_then(parse_display_count)
            .unwrap_or_else(|| {
                repaired.push("options");
                DisplayCount::default()
            });

        let created_at = self.created_at.as_ref().and_then(parse_timestamp);
        let updated_at = self.updated_at.as_ref().and_then(parse_timestamp);
        let created_at = created_at.or(updated_at).unwrap_or_else(|| {
            repaired.push("created_at");
            now
        });
        let updated_at = updated_at.unwrap_or(created_at);

        let mut invalidation_reason = reason;
        if status != TipStatus::Invalidated && invalidation_reason.is_some() {
            repaired.push("invalidationReason");
            invalidation_reason = None;
        }

        let should_display = match (status, self.should_display) {
            (TipStatus::Invalidated, Some(true)) => {
                repaired.push("shouldDisplay");
                false
            }
            (TipStatus::Invalidated, _) => false,
            (_, Some(flag)) => flag,
            (_, None) => {
                repaired.push("shouldDisplay");
                options.count <= options.value
            }
        };

        // Older releases stored the whole rule object; only the name survives.
        let rule = self
            .rule
            .as_ref()
            .and_then(|rule| rule.get("ruleName"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(RuleIdentity::new);

        if !repaired.is_empty() {
            warn!(
                "Normalized tip record '{}' (schema v{}): repaired {}",
                key,
                version,
                repaired.join(", ")
            );
        }

        TipRecord {
            schema_version: SCHEMA_VERSION,
            id: key.to_string(),
            status,
            should_display,
            invalidation_reason,
            created_at,
            updated_at,
            options: RecordOptions {
                max_display_count: options,
            },
            rule,
        }
    }
}

fn parse_enum<T: for<'de> Deserialize<'de>>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => s.parse::<DateTime<Utc>>().ok(),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn parse_display_count(options: &Value) -> Option<DisplayCount> {
    let counter = options.get("maxDisplayCount")?;
    let value = counter.get("value").and_then(as_u32);
    let count = counter.get("count").and_then(as_u32);
    if value.is_none() && count.is_none() {
        return None;
    }
    Some(DisplayCount {
        value: value.unwrap_or(0),
        count: count.unwrap_or(0),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    // JavaScript writers may store integral floats
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
        .map(|f| f.min(u32::MAX as f64) as u32)
}

// ================================================================================================
// TESTS
// ================================================================================================
