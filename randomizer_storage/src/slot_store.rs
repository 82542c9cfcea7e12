// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The contract every durable slot store must satisfy.
//!
//! A slot record has three phases:
//! 1. (ordinal has no record, slot is free)
//! 2. Pending (a session claimed the ordinal and is running the experiment)
//! 3. Finished (the session completed; terminal) or Expired (the slot was
//!    reclaimed from an abandoned session and the ordinal is free again)
//!
//! The single concurrency primitive the allocator depends on is `try_claim`:
//! an atomic "create a Pending record iff the ordinal is free". Everything
//! else layers on top of it; a store must never implement it as a
//! read-then-write visible to concurrent callers.

use std::time::{SystemTime, UNIX_EPOCH};

use randomizer_types::base_types::{SessionId, SlotAssignment, SlotOrdinal, SlotScope};
use randomizer_types::error::RandomizerResult;

/// Milliseconds since the Unix epoch; stamped onto records at claim time.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Durable key-value storage holding one record per (scope, ordinal).
///
/// Scopes partition records completely: operations on one scope never read
/// or write another, which is what gives experiment versions their
/// isolation. Claim conflicts are expected signals, not errors; only store
/// unavailability surfaces as `StorageError`.
pub trait SlotStore: Send + Sync {
    /// All records of one scope, ordered by ordinal, reflecting the latest
    /// committed state.
    fn read_all(&self, scope: &SlotScope) -> RandomizerResult<Vec<(SlotOrdinal, SlotAssignment)>>;

    /// Atomically create a `Pending` record for `session_id` at `ordinal`
    /// iff the ordinal is free (no record, or the previous occupant was
    /// reclaimed). Returns `false` when an active record is already there;
    /// the caller is expected to move on, not retry the same ordinal.
    fn try_claim(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        session_id: &SessionId,
    ) -> RandomizerResult<bool>;

    /// Transition `owner`'s record at `ordinal` from `Pending` to
    /// `Finished`. Idempotent: finishing an already-finished record is a
    /// no-op. Returns `SlotNotFound` when no record owned by `owner` is
    /// active at the ordinal.
    fn mark_finished(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        owner: &SessionId,
    ) -> RandomizerResult<()>;

    /// Transition `owner`'s record at `ordinal` from `Pending` to
    /// `Expired`, freeing the ordinal. Compare-and-swap semantics: returns
    /// `false` when the record is not a `Pending` record owned by `owner`
    /// anymore (already finished, already reclaimed, or re-claimed by a
    /// different session). A `Finished` record is never expired.
    fn mark_expired(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        owner: &SessionId,
    ) -> RandomizerResult<bool>;
}
