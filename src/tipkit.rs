//! Tip lifecycle engine.
//!
//! TipKit owns every rule about whether a tip may be shown: registration,
//! impression counting, invalidation, reset and rule evaluation. Records
//! live in an injected [`TipStore`]; the engine keeps no tip state of its own.
//!
//! # Read-modify-write
//! - Every mutation is a `get` followed by a `set` on the store
//! - No transaction spans the two calls
//! - Callers drive the engine from one UI thread; concurrent registration of
//!   the same id is not supported

use crate::config::TipKitConfig;
use crate::error::{TipError, TipResult};
use crate::events::{EventBroadcaster, TipEvent, TipSubscription};
use crate::record::{InvalidationReason, TipOptions, TipRecord, TipStatus};
use crate::rules::{RuleEvaluator, RuleOutcome, TipRule};
use crate::store::{MemoryStore, TipStore};
use crate::types::{now, validate_tip_id};
use log::{debug, error, info, warn};
use std::sync::Arc;

// ================================================================================================
// ENGINE
// ================================================================================================

/// The tip lifecycle engine.
///
/// Any number of rendered components may share one `TipKit` (through an
/// `Arc` or a [`TipKitProvider`](crate::TipKitProvider)); components using the
/// same tip id observe the same record.
pub struct TipKit {
    /// Durable record storage
    store: Arc<dyn TipStore>,
    /// Runs rule predicates with fault isolation
    evaluator: RuleEvaluator,
    /// Change notifications for rendered tips
    events: EventBroadcaster,
}

impl std::fmt::Debug for TipKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TipKit")
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

impl TipKit {
    /// Creates an engine over the given store.
    pub fn new(store: Arc<dyn TipStore>) -> Self {
        Self {
            store,
            evaluator: RuleEvaluator::new(),
            events: EventBroadcaster::new(),
        }
    }

    /// Creates an engine with the configured store backend.
    pub fn from_config(config: &TipKitConfig) -> TipResult<Self> {
        let store = config.open_store()?;
        Ok(Self::new(store))
    }

    /// Creates an engine over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn TipStore> {
        &self.store
    }

    // ============================================================================================
    // READ PATH
    // ============================================================================================

    /// Returns the current record for `id`, if registered.
    pub fn get_tip(&self, id: &str) -> TipResult<Option<TipRecord>> {
        validate_tip_id(id)?;
        self.load(id)
    }

    /// Whether the tip should be rendered right now.
    ///
    /// Never fails: a record that cannot be read is not shown.
    pub fn should_display(&self, id: &str) -> bool {
        match self.get_tip(id) {
            Ok(Some(record)) => record.should_display,
            Ok(None) => false,
            Err(e) => {
                error!("Failed to read tip '{}', hiding it: {}", id, e);
                false
            }
        }
    }

    /// Ids of every stored tip, in unspecified order.
    pub fn get_all_tip_ids(&self) -> TipResult<Vec<String>> {
        Ok(self.store.keys()?)
    }

    /// Receive an event for every change the engine writes.
    pub fn subscribe(&self) -> TipSubscription {
        self.events.subscribe()
    }

    // ============================================================================================
    // LIFECYCLE OPERATIONS
    // ============================================================================================

    /// Registers a tip, creating its record on first call.
    ///
    /// On later calls the stored cap is updated if `options` changed (the
    /// impression count is kept; a cap below the count invalidates the tip
    /// with `DisplayCountExceeded`) and the rule identity is replaced if
    /// `rule` has a different name. Identical calls write nothing, so this
    /// is safe to call on every render.
    ///
    /// When `rule` is given it is evaluated immediately. Returns the record
    /// after registration and evaluation.
    pub fn register_tip(
        &self,
        id: &str,
        options: TipOptions,
        rule: Option<&TipRule>,
    ) -> TipResult<TipRecord> {
        validate_tip_id(id)?;
        let now = now();

        let record = match self.load(id)? {
            None => {
                let record = TipRecord::new(id, options, rule.map(TipRule::identity), now);
                self.save(&record)?;
                debug!(
                    "Registered tip '{}' (max display count {})",
                    id, options.max_display_count
                );
                self.events.publish(TipEvent::Registered(record.clone()));
                record
            }
            Some(mut record) => {
                let mut changed = false;
                let mut exceeded = false;

                if let Some(rule) = rule {
                    if record.rule_name() != Some(rule.name()) {
                        debug!(
                            "Tip '{}' rule changed: {:?} -> '{}'",
                            id,
                            record.rule_name(),
                            rule.name()
                        );
                        record.rule = Some(rule.identity());
                        changed = true;
                    }
                }

                if record.max_display_count() != options.max_display_count {
                    exceeded = record.apply_cap(options.max_display_count, now);
                    changed = true;
                }

                if changed {
                    record.updated_at = now;
                    self.save(&record)?;
                    self.events.publish(TipEvent::Updated(record.clone()));
                }
                if exceeded {
                    info!(
                        "Tip '{}' invalidated: {} impressions exceed lowered cap of {}",
                        id,
                        record.display_count(),
                        record.max_display_count()
                    );
                    self.events.publish(TipEvent::Invalidated {
                        record: record.clone(),
                        reason: InvalidationReason::DisplayCountExceeded,
                    });
                }
                record
            }
        };

        match rule {
            Some(rule) => Ok(self.evaluate_rule(id, rule)?.unwrap_or(record)),
            None => Ok(record),
        }
    }

    /// Runs `rule` against the stored record for `id`.
    ///
    /// Also the entry point for re-evaluating after application state
    /// changed. Skipped when the record is missing, invalidated, or declares
    /// a different rule. A failing predicate is logged and leaves the record
    /// untouched.
    pub fn evaluate_rule(&self, id: &str, rule: &TipRule) -> TipResult<Option<TipRecord>> {
        validate_tip_id(id)?;

        let mut record = match self.load(id)? {
            Some(record) => record,
            None => {
                debug!("Rule '{}' skipped: tip '{}' not registered", rule.name(), id);
                return Ok(None);
            }
        };

        if record.rule_name() != Some(rule.name()) {
            debug!(
                "Rule '{}' skipped: tip '{}' declares {:?}",
                rule.name(),
                id,
                record.rule_name()
            );
            return Ok(Some(record));
        }

        if record.is_invalidated() {
            debug!("Rule '{}' skipped: tip '{}' is invalidated", rule.name(), id);
            return Ok(Some(record));
        }

        let status = match self.evaluator.evaluate(rule) {
            RuleOutcome::Satisfied => TipStatus::Available,
            RuleOutcome::Unsatisfied => TipStatus::Pending,
            RuleOutcome::Failed(reason) => {
                error!(
                    "Error evaluating rule '{}' for tip '{}': {}",
                    rule.name(),
                    id,
                    reason
                );
                return Ok(Some(record));
            }
        };

        if status == record.status {
            return Ok(Some(record));
        }

        let previous = record.status;
        record.status = status;
        record.updated_at = now();
        self.save(&record)?;
        debug!("Tip '{}' status {} -> {}", id, previous, status);
        self.events.publish(TipEvent::StatusChanged {
            record: record.clone(),
            previous,
        });

        Ok(Some(record))
    }

    /// Counts one impression of the tip.
    ///
    /// Call only when the tip is about to be shown (see [`TipKit::show_tip`]).
    /// The impression that pushes the count past the cap invalidates the tip
    /// with [`InvalidationReason::DisplayCountExceeded`] in the same write.
    /// No-op for unknown or invalidated tips.
    pub fn record_impression(&self, id: &str) -> TipResult<Option<TipRecord>> {
        validate_tip_id(id)?;

        let mut record = match self.load(id)? {
            Some(record) => record,
            None => {
                debug!("Impression ignored: tip '{}' not registered", id);
                return Ok(None);
            }
        };

        if record.is_invalidated() {
            debug!("Impression ignored: tip '{}' is invalidated", id);
            return Ok(Some(record));
        }

        let exceeded = record.apply_impression(now());
        self.save(&record)?;
        self.events
            .publish(TipEvent::ImpressionRecorded(record.clone()));

        if exceeded {
            info!(
                "Tip '{}' invalidated: {} impressions exceed cap of {}",
                id,
                record.display_count(),
                record.max_display_count()
            );
            self.events.publish(TipEvent::Invalidated {
                record: record.clone(),
                reason: InvalidationReason::DisplayCountExceeded,
            });
        }

        Ok(Some(record))
    }

    /// Alias of [`TipKit::record_impression`] under its historical name.
    pub fn increase_display_count(&self, id: &str) -> TipResult<Option<TipRecord>> {
        self.record_impression(id)
    }

    /// Decides whether to show the tip now and, if so, counts the impression.
    ///
    /// Returns true when the tip should be rendered for this impression. A
    /// tip that is hidden, pending or unknown is not counted.
    pub fn show_tip(&self, id: &str) -> TipResult<bool> {
        let eligible = self
            .get_tip(id)?
            .map(|record| record.is_eligible())
            .unwrap_or(false);
        if !eligible {
            return Ok(false);
        }

        Ok(self
            .record_impression(id)?
            .map(|record| record.should_display)
            .unwrap_or(false))
    }

    /// Permanently retires the tip until a reset. No-op for unknown tips.
    pub fn invalidate_tip(
        &self,
        id: &str,
        reason: InvalidationReason,
    ) -> TipResult<Option<TipRecord>> {
        validate_tip_id(id)?;

        let mut record = match self.load(id)? {
            Some(record) => record,
            None => {
                debug!("Invalidation ignored: tip '{}' not registered", id);
                return Ok(None);
            }
        };

        record.apply_invalidation(reason, now());
        self.save(&record)?;
        info!("Tip '{}' invalidated: {}", id, reason);
        self.events.publish(TipEvent::Invalidated {
            record: record.clone(),
            reason,
        });

        Ok(Some(record))
    }

    /// Restores one tip to a fresh, displayable state, keeping its cap.
    pub fn reset_tip(&self, id: &str) -> TipResult<Option<TipRecord>> {
        validate_tip_id(id)?;

        let mut record = match self.load(id)? {
            Some(record) => record,
            None => return Ok(None),
        };

        record.apply_reset(now());
        self.save(&record)?;
        info!("Tip '{}' reset", id);
        self.events.publish(TipEvent::Reset(record.clone()));

        Ok(Some(record))
    }

    /// Resets every stored tip. Returns how many records were rewritten.
    ///
    /// Meant for explicit "start over" actions and debugging; the engine
    /// never calls it on its own. Undecodable records are skipped.
    pub fn reset_datastore(&self) -> TipResult<usize> {
        let now = now();
        let mut reset = 0;

        for id in self.store.keys()? {
            let mut record = match self.load(&id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(TipError::Codec { id, source }) => {
                    warn!("Reset skipped undecodable tip '{}': {}", id, source);
                    continue;
                }
                Err(e) => return Err(e),
            };

            record.apply_reset(now);
            self.save(&record)?;
            self.events.publish(TipEvent::Reset(record));
            reset += 1;
        }

        info!("Reset {} tips", reset);
        Ok(reset)
    }

    /// Deletes every record, configuration included.
    pub fn clean_datastore(&self) -> TipResult<()> {
        self.store.clear_all()?;
        info!("Tip datastore cleared");
        self.events.publish(TipEvent::Cleared);
        Ok(())
    }

    // ============================================================================================
    // STATISTICS
    // ============================================================================================

    /// Counts stored tips by state.
    pub fn stats(&self) -> TipResult<TipKitStats> {
        let mut stats = TipKitStats::default();

        for id in self.store.keys()? {
            stats.total_tips += 1;
            match self.load(&id) {
                Ok(Some(record)) => {
                    match record.status {
                        TipStatus::Available => stats.available += 1,
                        TipStatus::Pending => stats.pending += 1,
                        TipStatus::Invalidated => stats.invalidated += 1,
                    }
                    if record.should_display {
                        stats.displayable += 1;
                    }
                    stats.total_impressions += u64::from(record.display_count());
                }
                Ok(None) => stats.total_tips -= 1,
                Err(TipError::Codec { .. }) => stats.unreadable += 1,
                Err(e) => return Err(e),
            }
        }

        Ok(stats)
    }

    // ============================================================================================
    // STORE ACCESS
    // ============================================================================================

    fn load(&self, id: &str) -> TipResult<Option<TipRecord>> {
        match self.store.get(id)? {
            Some(raw) => TipRecord::decode(id, &raw)
                .map(Some)
                .map_err(|source| TipError::Codec {
                    id: id.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn save(&self, record: &TipRecord) -> TipResult<()> {
        let raw = record.encode().map_err(|source| TipError::Codec {
            id: record.id.clone(),
            source,
        })?;
        self.store.set(&record.id, &raw)?;
        Ok(())
    }
}

// ================================================================================================
// STATISTICS STRUCTURES
// ================================================================================================

/// Store-wide tip statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TipKitStats {
    /// Stored records
    pub total_tips: usize,

    pub available: usize,

    pub pending: usize,

    pub invalidated: usize,

    /// Records with `should_display` set
    pub displayable: usize,

    /// Records that could not be decoded
    pub unreadable: usize,

    /// Sum of impression counts
    pub total_impressions: u64,
}

// ================================================================================================
// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn register(kit: &TipKit, id: &str, max: u32) -> TipRecord {
        kit.register_tip(id, TipOptions::new(max), None).unwrap()
    }

    #[test]
    fn test_register_creates_available_record() {
        let kit = TipKit::in_memory();
        let record = register(&kit, "t1", 2);

        assert_eq!(record.status, TipStatus::Available);
        assert!(record.should_display);
        assert_eq!(record.display_count(), 0);
        assert_eq!(record.max_display_count(), 2);
        assert_eq!(kit.get_tip("t1").unwrap(), Some(record));
    }

    #[test]
    fn test_register_rejects_empty_id() {
        let kit = TipKit::in_memory();
        let result = kit.register_tip("", TipOptions::new(1), None);
        assert!(matches!(result, Err(TipError::InvalidTipId(_))));
        assert!(kit.get_all_tip_ids().unwrap().is_empty());
    }

    #[test]
    fn test_register_is_idempotent() {
        let kit = TipKit::in_memory();
        let first = register(&kit, "t1", 3);
        let raw_before = kit.store().get("t1").unwrap();

        let second = register(&kit, "t1", 3);
        assert_eq!(first, second);
        assert_eq!(kit.store().get("t1").unwrap(), raw_before);
    }

    #[test]
    fn test_register_updates_cap_without_resetting_count() {
        let kit = TipKit::in_memory();
        register(&kit, "t1", 3);
        kit.record_impression("t1").unwrap();

        let record = register(&kit, "t1", 5);
        assert_eq!(record.max_display_count(), 5);
        assert_eq!(record.display_count(), 1);
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_register_lowering_cap_below_count_invalidates() {
        let kit = TipKit::in_memory();
        register(&kit, "t1", 3);
        kit.record_impression("t1").unwrap();
        kit.record_impression("t1").unwrap();
        let events = kit.subscribe();

        let record = register(&kit, "t1", 1);
        assert_eq!(record.display_count(), 2);
        assert_eq!(record.status, TipStatus::Invalidated);
        assert!(!record.should_display);
        assert_eq!(
            record.invalidation_reason,
            Some(InvalidationReason::DisplayCountExceeded)
        );
        assert_eq!(kit.get_tip("t1").unwrap(), Some(record));
        assert!(!kit.should_display("t1"));

        let received = events.drain();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[1], TipEvent::Invalidated { .. }));
    }

    #[test]
    fn test_register_lowering_cap_to_count_keeps_tip() {
        let kit = TipKit::in_memory();
        register(&kit, "t1", 3);
        kit.record_impression("t1").unwrap();

        let record = register(&kit, "t1", 1);
        assert_eq!(record.status, TipStatus::Available);
        assert!(record.should_display);
    }

    #[test]
    fn test_impression_on_unknown_tip_is_noop() {
        let kit = TipKit::in_memory();
        assert_eq!(kit.record_impression("ghost").unwrap(), None);
        assert_eq!(
            kit.invalidate_tip("ghost", InvalidationReason::TipClosed).unwrap(),
            None
        );
        assert_eq!(kit.reset_tip("ghost").unwrap(), None);
        assert!(kit.get_all_tip_ids().unwrap().is_empty());
    }

    #[test]
    fn test_should_display_hides_unreadable_record() {
        let kit = TipKit::in_memory();
        kit.store().set("broken", "not json").unwrap();

        assert!(!kit.should_display("broken"));
        assert!(!kit.should_display("missing"));
        assert!(matches!(
            kit.get_tip("broken"),
            Err(TipError::Codec { .. })
        ));
    }

    #[test]
    fn test_json_array_is_not_a_record() {
        let kit = TipKit::in_memory();
        kit.store().set("arr", "[]").unwrap();

        assert!(!kit.should_display("arr"));
        assert!(!kit.show_tip("arr").unwrap_or(false));
        assert!(matches!(kit.get_tip("arr"), Err(TipError::Codec { .. })));
        assert_eq!(kit.stats().unwrap().unreadable, 1);
    }

    #[test]
    fn test_reset_datastore_skips_unreadable_records() {
        let kit = TipKit::in_memory();
        register(&kit, "t1", 1);
        kit.invalidate_tip("t1", InvalidationReason::TipClosed).unwrap();
        kit.store().set("broken", "not json").unwrap();

        assert_eq!(kit.reset_datastore().unwrap(), 1);
        assert!(kit.should_display("t1"));
    }

    #[test]
    fn test_stats_counts_states() {
        let kit = TipKit::in_memory();
        register(&kit, "a", 1);
        register(&kit, "b", 1);
        register(&kit, "c", 1);
        kit.record_impression("a").unwrap();
        kit.invalidate_tip("b", InvalidationReason::ActionPerformed)
            .unwrap();
        kit.register_tip("c", TipOptions::new(1), Some(&TipRule::new("never", || false)))
            .unwrap();
        kit.store().set("broken", "[").unwrap();

        let stats = kit.stats().unwrap();
        assert_eq!(
            stats,
            TipKitStats {
                total_tips: 4,
                available: 1,
                pending: 1,
                invalidated: 1,
                displayable: 2,
                unreadable: 1,
                total_impressions: 1,
            }
        );
    }
}
