// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "unit_tests/base_types_tests.rs"]
mod base_types_tests;

/// Separator used when a condition label is composed from factor levels,
/// e.g. factors `A` and `B` at levels `A1`/`B2` yield condition `A1.B2`.
pub const FACTOR_SEPARATOR: char = '.';

/// Ordinal of one capacity unit within a condition's (or pool's) target.
pub type SlotOrdinal = u32;

/// Identifier of one participant session, owned by the hosting experiment
/// layer. The randomizer never creates sessions, it only binds them to slots.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Random identifier for tests and examples.
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s#{}", self.0)
    }
}

/// Revision tag of an experiment. Part of every slot key, so that re-running
/// a revised experiment never collides with an earlier revision's records.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct ExperimentVersion(String);

impl ExperimentVersion {
    pub fn new<S: Into<String>>(version: S) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExperimentVersion {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}

impl From<u64> for ExperimentVersion {
    fn from(version: u64) -> Self {
        Self(version.to_string())
    }
}

impl fmt::Display for ExperimentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named experimental arm to which sessions are randomized.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct Condition(String);

impl Condition {
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self(label.into())
    }

    /// Compose a condition label from factor levels in declaration order.
    pub fn from_levels<S: AsRef<str>>(levels: &[S]) -> Self {
        let label = levels
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join(&FACTOR_SEPARATOR.to_string());
        Self(label)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Condition {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partition key of one slot pool in the store: (randomizer name, experiment
/// version, condition). Slot records of different scopes never interact;
/// in particular a version bump isolates a fresh pool.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct SlotScope {
    pub namespace: String,
    pub version: ExperimentVersion,
    pub pool: Condition,
}

impl SlotScope {
    pub fn new<S: Into<String>>(namespace: S, version: ExperimentVersion, pool: Condition) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            pool,
        }
    }
}

impl fmt::Display for SlotScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.namespace, self.version, self.pool)
    }
}

/// Phase of a slot assignment.
///
/// `Pending` and `Finished` are the active phases that occupy capacity;
/// `Expired` marks a reclaimed slot whose ordinal is free again. `Finished`
/// is terminal: a finished slot is never reclaimed or reassigned.
#[derive(Eq, PartialEq, Copy, Clone, Hash, Debug, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Pending,
    Finished,
    Expired,
}

impl AssignmentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentStatus::Pending | AssignmentStatus::Finished)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Finished => "finished",
            AssignmentStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Durable record binding a session to one slot ordinal.
#[derive(Eq, PartialEq, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub session_id: SessionId,
    pub status: AssignmentStatus,
    /// Milliseconds since the Unix epoch, set by the store at claim time.
    pub created_at: u64,
}

impl SlotAssignment {
    pub fn new_pending(session_id: SessionId, created_at: u64) -> Self {
        Self {
            session_id,
            status: AssignmentStatus::Pending,
            created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_owned_by(&self, session_id: &SessionId) -> bool {
        &self.session_id == session_id
    }
}
