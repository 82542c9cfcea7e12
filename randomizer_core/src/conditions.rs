// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use randomizer_types::base_types::Condition;
use randomizer_types::error::{RandomizerError, RandomizerResult};
use randomizer_types::{fp_bail, fp_ensure};

#[cfg(test)]
#[path = "unit_tests/conditions_tests.rs"]
mod conditions_tests;

/// A named attribute with an ordered set of distinct levels.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Factor {
    name: String,
    levels: Vec<String>,
}

impl Factor {
    pub fn new<N, L, S>(name: N, levels: L) -> Self
    where
        N: Into<String>,
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }
}

/// An ordered set of factors whose Cartesian product defines a condition
/// set. Every level combination yields exactly one condition, rendered
/// `level_1.level_2...level_n` in factor-declaration order.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct FactorSpace {
    factors: Vec<Factor>,
}

impl FactorSpace {
    pub fn new(factors: Vec<Factor>) -> RandomizerResult<Self> {
        fp_ensure!(!factors.is_empty(), RandomizerError::EmptyConditionSet);
        for factor in &factors {
            fp_ensure!(
                factor.levels.len() >= 2,
                RandomizerError::FactorLevelArityViolation {
                    factor: factor.name.clone(),
                }
            );
            let mut seen = BTreeSet::new();
            for level in &factor.levels {
                fp_ensure!(
                    seen.insert(level),
                    RandomizerError::DuplicateFactorLevel {
                        factor: factor.name.clone(),
                        level: level.clone(),
                    }
                );
            }
        }
        Ok(Self { factors })
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// The full cross-product, in lexicographic order of factor declaration.
    pub fn conditions(&self) -> Vec<Condition> {
        self.factors
            .iter()
            .map(|f| f.levels.iter())
            .multi_cartesian_product()
            .map(|combo| Condition::from_levels(&combo))
            .collect()
    }
}

/// How slot capacity is distributed over the conditions.
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum TargetSpec {
    /// One total, split evenly; must divide by the condition count.
    Total(u32),
    /// Explicit per-condition targets; must cover exactly the condition set.
    PerCondition(BTreeMap<String, u32>),
}

/// The validated condition set of one randomizer: conditions in declaration
/// order, each with its slot target. Construction is the configuration
/// gate; every error here is fatal before any session can be created.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
    targets: Vec<u32>,
}

impl ConditionSet {
    /// Build from an explicit list of condition labels.
    pub fn with_conditions<S: Into<String>>(
        labels: Vec<S>,
        targets: TargetSpec,
    ) -> RandomizerResult<Self> {
        let conditions = labels.into_iter().map(|l| Condition::new(l)).collect();
        Self::build(conditions, targets)
    }

    /// Build from the cross-product of a factor space.
    pub fn from_factors(space: &FactorSpace, targets: TargetSpec) -> RandomizerResult<Self> {
        Self::build(space.conditions(), targets)
    }

    fn build(conditions: Vec<Condition>, targets: TargetSpec) -> RandomizerResult<Self> {
        fp_ensure!(!conditions.is_empty(), RandomizerError::EmptyConditionSet);
        let mut seen = BTreeSet::new();
        for condition in &conditions {
            fp_ensure!(
                seen.insert(condition.clone()),
                RandomizerError::DuplicateCondition {
                    condition: condition.to_string(),
                }
            );
        }

        let targets = match targets {
            TargetSpec::Total(total) => {
                fp_ensure!(
                    total > 0,
                    RandomizerError::ZeroTarget {
                        condition: "(total)".to_string(),
                    }
                );
                fp_ensure!(
                    total as usize % conditions.len() == 0,
                    RandomizerError::IndivisibleTarget {
                        total,
                        condition_count: conditions.len(),
                    }
                );
                let share = total / conditions.len() as u32;
                vec![share; conditions.len()]
            }
            TargetSpec::PerCondition(mut by_condition) => {
                let mut targets = Vec::with_capacity(conditions.len());
                for condition in &conditions {
                    let target = by_condition.remove(condition.as_str()).ok_or_else(|| {
                        RandomizerError::TargetConditionMismatch {
                            error: format!("no target supplied for condition {condition}"),
                        }
                    })?;
                    fp_ensure!(
                        target > 0,
                        RandomizerError::ZeroTarget {
                            condition: condition.to_string(),
                        }
                    );
                    targets.push(target);
                }
                if let Some((unknown, _)) = by_condition.into_iter().next() {
                    fp_bail!(RandomizerError::TargetConditionMismatch {
                        error: format!("target supplied for unknown condition {unknown}"),
                    });
                }
                targets
            }
        };

        Ok(Self {
            conditions,
            targets,
        })
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn total_target(&self) -> u32 {
        self.targets.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Condition, u32)> {
        self.conditions.iter().zip(self.targets.iter().copied())
    }
}
