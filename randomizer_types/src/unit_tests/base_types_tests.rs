// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_condition_from_levels() {
    let cond = Condition::from_levels(&["A1", "B2", "C1"]);
    assert_eq!(cond.as_str(), "A1.B2.C1");
    assert_eq!(cond.to_string(), "A1.B2.C1");

    let single = Condition::from_levels(&["only"]);
    assert_eq!(single.as_str(), "only");
}

#[test]
fn test_status_active_phases() {
    assert!(AssignmentStatus::Pending.is_active());
    assert!(AssignmentStatus::Finished.is_active());
    assert!(!AssignmentStatus::Expired.is_active());
}

#[test]
fn test_assignment_ownership() {
    let s1 = SessionId::new("s1");
    let record = SlotAssignment::new_pending(s1.clone(), 42);
    assert_eq!(record.status, AssignmentStatus::Pending);
    assert_eq!(record.created_at, 42);
    assert!(record.is_active());
    assert!(record.is_owned_by(&s1));
    assert!(!record.is_owned_by(&SessionId::new("s2")));
}

#[test]
fn test_scope_display_and_ordering() {
    let scope = SlotScope::new(
        "main_randomizer",
        ExperimentVersion::from("1.0"),
        Condition::new("a"),
    );
    assert_eq!(scope.to_string(), "main_randomizer@1.0/a");

    // Scopes with different versions are distinct keys.
    let bumped = SlotScope::new(
        "main_randomizer",
        ExperimentVersion::from("2.0"),
        Condition::new("a"),
    );
    assert_ne!(scope, bumped);
}

#[test]
fn test_random_session_ids_are_distinct() {
    let a = SessionId::random();
    let b = SessionId::random();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 32);
}

#[test]
fn test_assignment_record_serde_roundtrip() {
    let record = SlotAssignment {
        session_id: SessionId::new("abc"),
        status: AssignmentStatus::Finished,
        created_at: 1_650_000_000_000,
    };
    let json = serde_json::to_string(&record).unwrap();
    let back: SlotAssignment = serde_json::from_str(&json).unwrap();
    assert_eq!(record, back);
}
