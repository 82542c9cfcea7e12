// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use pretty_assertions::assert_eq;

fn two_by_two() -> FactorSpace {
    FactorSpace::new(vec![
        Factor::new("A", ["A1", "A2"]),
        Factor::new("B", ["B1", "B2"]),
    ])
    .unwrap()
}

#[test]
fn test_factor_cross_product() {
    let conditions = two_by_two().conditions();
    let labels: Vec<&str> = conditions.iter().map(|c| c.as_str()).collect();
    assert_eq!(labels, vec!["A1.B1", "A1.B2", "A2.B1", "A2.B2"]);
}

#[test]
fn test_three_factor_product_order() {
    let space = FactorSpace::new(vec![
        Factor::new("A", ["A1", "A2"]),
        Factor::new("B", ["B1", "B2"]),
        Factor::new("C", ["C1", "C2"]),
    ])
    .unwrap();
    let conditions = space.conditions();
    assert_eq!(conditions.len(), 8);
    // Factor-declaration order: last factor varies fastest.
    assert_eq!(conditions[0].as_str(), "A1.B1.C1");
    assert_eq!(conditions[1].as_str(), "A1.B1.C2");
    assert_eq!(conditions[7].as_str(), "A2.B2.C2");
}

#[test]
fn test_total_target_divides_evenly() {
    let set = ConditionSet::from_factors(&two_by_two(), TargetSpec::Total(20)).unwrap();
    assert_eq!(set.len(), 4);
    assert_eq!(set.total_target(), 20);
    for (_, target) in set.iter() {
        assert_eq!(target, 5);
    }
}

#[test]
fn test_indivisible_total_is_rejected() {
    assert_eq!(
        ConditionSet::from_factors(&two_by_two(), TargetSpec::Total(10)),
        Err(RandomizerError::IndivisibleTarget {
            total: 10,
            condition_count: 4,
        })
    );
}

#[test]
fn test_single_level_factor_is_rejected() {
    assert_eq!(
        FactorSpace::new(vec![Factor::new("A", ["only"])]),
        Err(RandomizerError::FactorLevelArityViolation {
            factor: "A".to_string(),
        })
    );
}

#[test]
fn test_duplicate_level_is_rejected() {
    assert_eq!(
        FactorSpace::new(vec![Factor::new("A", ["x", "x"])]),
        Err(RandomizerError::DuplicateFactorLevel {
            factor: "A".to_string(),
            level: "x".to_string(),
        })
    );
}

#[test]
fn test_explicit_conditions_with_per_condition_targets() {
    let targets = TargetSpec::PerCondition(
        [("a".to_string(), 2u32), ("b".to_string(), 4u32)]
            .into_iter()
            .collect(),
    );
    let set = ConditionSet::with_conditions(vec!["a", "b"], targets).unwrap();
    let by_condition: Vec<(&str, u32)> = set.iter().map(|(c, t)| (c.as_str(), t)).collect();
    assert_eq!(by_condition, vec![("a", 2), ("b", 4)]);
    assert_eq!(set.total_target(), 6);
}

#[test]
fn test_per_condition_target_mismatch() {
    // Missing condition.
    let missing = TargetSpec::PerCondition([("a".to_string(), 2u32)].into_iter().collect());
    assert!(matches!(
        ConditionSet::with_conditions(vec!["a", "b"], missing),
        Err(RandomizerError::TargetConditionMismatch { .. })
    ));

    // Target for a condition that was never generated.
    let extra = TargetSpec::PerCondition(
        [
            ("a".to_string(), 2u32),
            ("b".to_string(), 2u32),
            ("c".to_string(), 2u32),
        ]
        .into_iter()
        .collect(),
    );
    assert!(matches!(
        ConditionSet::with_conditions(vec!["a", "b"], extra),
        Err(RandomizerError::TargetConditionMismatch { .. })
    ));
}

#[test]
fn test_zero_targets_are_rejected() {
    assert!(matches!(
        ConditionSet::with_conditions(vec!["a", "b"], TargetSpec::Total(0)),
        Err(RandomizerError::ZeroTarget { .. })
    ));

    let zeroed = TargetSpec::PerCondition(
        [("a".to_string(), 0u32), ("b".to_string(), 2u32)]
            .into_iter()
            .collect(),
    );
    assert_eq!(
        ConditionSet::with_conditions(vec!["a", "b"], zeroed),
        Err(RandomizerError::ZeroTarget {
            condition: "a".to_string(),
        })
    );
}

#[test]
fn test_duplicate_condition_is_rejected() {
    assert_eq!(
        ConditionSet::with_conditions(vec!["a", "a"], TargetSpec::Total(4)),
        Err(RandomizerError::DuplicateCondition {
            condition: "a".to_string(),
        })
    );
}

#[test]
fn test_empty_sets_are_rejected() {
    assert_eq!(
        ConditionSet::with_conditions(Vec::<String>::new(), TargetSpec::Total(4)),
        Err(RandomizerError::EmptyConditionSet)
    );
    assert_eq!(
        FactorSpace::new(vec![]),
        Err(RandomizerError::EmptyConditionSet)
    );
}
