// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0
#![warn(
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    rust_2021_compatibility
)]

pub mod allocator;
pub mod conditions;
pub mod liveness;

pub use allocator::{AssignOutcome, ListRandomizer, PoolStatus, QuotaOutcome, SessionQuota};
pub use conditions::{ConditionSet, Factor, FactorSpace, TargetSpec};
pub use liveness::{SessionLiveness, SessionRegistry};
