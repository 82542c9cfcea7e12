// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::base_types::{SessionId, SlotOrdinal};
use serde::{Deserialize, Serialize};

#[macro_export]
macro_rules! fp_bail {
    ($e:expr) => {
        return Err($e)
    };
}

#[macro_export(local_inner_macros)]
macro_rules! fp_ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            fp_bail!($e);
        }
    };
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize, Error, Hash)]
/// Custom error type for the randomizer core.
pub enum RandomizerError {
    // Condition/factor configuration issues, all fatal at construction time
    #[error("A randomizer must have at least one condition")]
    EmptyConditionSet,
    #[error("Condition {condition} appears more than once in the condition set")]
    DuplicateCondition { condition: String },
    #[error("Factor {factor} must declare at least two levels")]
    FactorLevelArityViolation { factor: String },
    #[error("Factor {factor} declares level {level} more than once")]
    DuplicateFactorLevel { factor: String, level: String },
    #[error("Slot target for condition {condition} must be at least 1")]
    ZeroTarget { condition: String },
    #[error(
        "Total target {total} does not divide evenly over {condition_count} conditions"
    )]
    IndivisibleTarget { total: u32, condition_count: usize },
    #[error("Per-condition targets do not cover the condition set: {error}")]
    TargetConditionMismatch { error: String },
    #[error("Randomizer name and version must be non-empty")]
    EmptyNamespace,

    // Session admission
    #[error("Session {session_id:?} is not eligible to participate")]
    SessionNotEligible { session_id: SessionId },

    // Slot store
    #[error("No slot assignment exists at ordinal {ordinal}")]
    SlotNotFound { ordinal: SlotOrdinal },
    #[error("Slot record could not be serialized: {error}")]
    SlotSerializationError { error: String },
    #[error("Storage error: {error}")]
    StorageError { error: String },
}

pub type RandomizerResult<T = ()> = Result<T, RandomizerError>;
