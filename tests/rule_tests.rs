//! Rule gating tests.
//!
//! Tests verify:
//! - Rules evaluate on registration and move tips between available/pending
//! - Rule faults (errors and panics) leave records untouched
//! - Rules never invalidate a tip
//! - Renamed rules replace the stored identity

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tipkit::{TipKit, TipOptions, TipRule, TipStatus};

fn toggle_rule(name: &str) -> (TipRule, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&flag);
    (TipRule::new(name, move || seen.load(Ordering::SeqCst)), flag)
}

#[test]
fn test_false_rule_marks_tip_pending_on_registration() {
    let kit = TipKit::in_memory();
    let rule = TipRule::new("never", || false);

    let record = kit.register_tip("t2", TipOptions::new(3), Some(&rule)).unwrap();
    assert_eq!(record.status, TipStatus::Pending);
    assert_eq!(record.display_count(), 0);
    assert!(record.should_display, "pending does not touch should_display");
    assert_eq!(record.rule_name(), Some("never"));
}

#[test]
fn test_rule_alternates_between_available_and_pending() {
    let kit = TipKit::in_memory();
    let (rule, flag) = toggle_rule("toggle");

    for round in 0..6 {
        let expected = round % 2 == 1;
        flag.store(expected, Ordering::SeqCst);

        let record = kit.register_tip("t1", TipOptions::new(3), Some(&rule)).unwrap();
        let status = if expected {
            TipStatus::Available
        } else {
            TipStatus::Pending
        };
        assert_eq!(record.status, status, "round {}", round);
        assert_ne!(record.status, TipStatus::Invalidated);
    }
}

#[test]
fn test_explicit_reevaluation_without_registration() {
    let kit = TipKit::in_memory();
    let (rule, flag) = toggle_rule("toggle");
    kit.register_tip("t1", TipOptions::new(3), Some(&rule)).unwrap();
    assert_eq!(kit.get_tip("t1").unwrap().unwrap().status, TipStatus::Pending);

    flag.store(true, Ordering::SeqCst);
    let record = kit.evaluate_rule("t1", &rule).unwrap().unwrap();
    assert_eq!(record.status, TipStatus::Available);
}

#[test]
fn test_failing_rule_leaves_record_untouched() {
    let kit = TipKit::in_memory();
    let (rule, _flag) = toggle_rule("flaky");
    let pending = kit.register_tip("t1", TipOptions::new(3), Some(&rule)).unwrap();

    let failing = TipRule::fallible("flaky", || Err::<bool, _>("remote config unavailable"));
    let after = kit.register_tip("t1", TipOptions::new(3), Some(&failing)).unwrap();
    assert_eq!(after, pending);

    let panicking = TipRule::new("flaky", || panic!("predicate blew up"));
    let after = kit.evaluate_rule("t1", &panicking).unwrap().unwrap();
    assert_eq!(after, pending);
}

#[test]
fn test_rule_for_other_name_is_skipped() {
    let kit = TipKit::in_memory();
    kit.register_tip("t1", TipOptions::new(3), Some(&TipRule::new("a", || true)))
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let other = TipRule::new("b", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        false
    });

    let record = kit.evaluate_rule("t1", &other).unwrap().unwrap();
    assert_eq!(record.status, TipStatus::Available);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_renamed_rule_replaces_identity_and_reevaluates() {
    let kit = TipKit::in_memory();
    kit.register_tip("t1", TipOptions::new(3), Some(&TipRule::new("v1", || true)))
        .unwrap();

    let record = kit
        .register_tip("t1", TipOptions::new(3), Some(&TipRule::new("v2", || false)))
        .unwrap();
    assert_eq!(record.rule_name(), Some("v2"));
    assert_eq!(record.status, TipStatus::Pending);
}

#[test]
fn test_rule_on_unregistered_tip_is_noop() {
    let kit = TipKit::in_memory();
    let rule = TipRule::new("any", || true);
    assert_eq!(kit.evaluate_rule("ghost", &rule).unwrap(), None);
    assert!(kit.get_all_tip_ids().unwrap().is_empty());
}

#[test]
fn test_rule_does_not_revive_exhausted_tip() {
    let kit = TipKit::in_memory();
    let rule = TipRule::new("always", || true);
    kit.register_tip("t1", TipOptions::new(1), Some(&rule)).unwrap();
    kit.record_impression("t1").unwrap();
    kit.record_impression("t1").unwrap();

    let record = kit.register_tip("t1", TipOptions::new(1), Some(&rule)).unwrap();
    assert_eq!(record.status, TipStatus::Invalidated);
    assert!(!record.should_display);
}
