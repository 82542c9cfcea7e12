// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Slot allocation over a shared durable store.
//!
//! `SlotPools` runs the identical per-pool logic for any number of pools;
//! `ListRandomizer` is the N-condition case and `SessionQuota` the
//! single-pool case. All state lives in the store, so the engine is usable
//! through a shared reference from any number of request handlers, and
//! repeating a valid `assign` produces no changes and no error.
//!
//! The only mutual exclusion in the design is the store's `try_claim`; a
//! lost claim is a signal to move on, never an error and never a wait.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use randomizer_types::base_types::{
    AssignmentStatus, Condition, ExperimentVersion, SessionId, SlotAssignment, SlotOrdinal,
    SlotScope,
};
use randomizer_types::error::{RandomizerError, RandomizerResult};
use randomizer_types::{fp_bail, fp_ensure};
use randomizer_storage::SlotStore;

use crate::conditions::ConditionSet;
use crate::liveness::SessionLiveness;

#[cfg(test)]
#[path = "unit_tests/allocator_tests.rs"]
mod allocator_tests;

/// Label of the implicit pool used by `SessionQuota`.
const QUOTA_POOL_LABEL: &str = "__pool__";

/// Outcome of a randomizer `assign` call. `Full` is an expected outcome the
/// experiment handles (typically by aborting the session with a message),
/// not an error.
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum AssignOutcome {
    Assigned(Condition),
    Full,
}

impl AssignOutcome {
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            AssignOutcome::Assigned(condition) => Some(condition),
            AssignOutcome::Full => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, AssignOutcome::Full)
    }
}

/// Outcome of a quota-controller `assign` call.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum QuotaOutcome {
    Granted,
    Full,
}

impl QuotaOutcome {
    pub fn is_full(&self) -> bool {
        matches!(self, QuotaOutcome::Full)
    }
}

/// Monitoring counts for one pool. Derived by scanning current records;
/// eventually consistent under concurrent mutation and never used for
/// allocation decisions.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct PoolStatus {
    pub condition: Condition,
    pub target: u32,
    pub n_open: u32,
    pub n_pending: u32,
    pub n_finished: u32,
}

/// The shared allocation engine: a set of slot pools in one store
/// namespace, claimed one ordinal at a time.
struct SlotPools {
    namespace: String,
    version: ExperimentVersion,
    pools: Vec<(Condition, u32)>,
    store: Arc<dyn SlotStore>,
    liveness: Arc<dyn SessionLiveness>,
    allowed_sessions: Option<BTreeSet<SessionId>>,
}

impl SlotPools {
    fn new(
        namespace: String,
        version: ExperimentVersion,
        pools: Vec<(Condition, u32)>,
        store: Arc<dyn SlotStore>,
        liveness: Arc<dyn SessionLiveness>,
    ) -> RandomizerResult<Self> {
        fp_ensure!(
            !namespace.is_empty() && !version.as_str().is_empty(),
            RandomizerError::EmptyNamespace
        );
        Ok(Self {
            namespace,
            version,
            pools,
            store,
            liveness,
            allowed_sessions: None,
        })
    }

    fn scope(&self, pool: &Condition) -> SlotScope {
        SlotScope::new(self.namespace.clone(), self.version.clone(), pool.clone())
    }

    fn check_eligible(&self, session_id: &SessionId) -> RandomizerResult {
        if let Some(allowed) = &self.allowed_sessions {
            fp_ensure!(
                allowed.contains(session_id),
                RandomizerError::SessionNotEligible {
                    session_id: session_id.clone(),
                }
            );
        }
        Ok(())
    }

    /// Find the session's own active record, if any. This is what makes
    /// `assign` idempotent across reloads and navigation.
    fn existing_assignment(
        &self,
        session_id: &SessionId,
    ) -> RandomizerResult<Option<(Condition, SlotOrdinal, AssignmentStatus)>> {
        for (condition, _) in &self.pools {
            let scope = self.scope(condition);
            for (ordinal, record) in self.store.read_all(&scope)? {
                if record.is_active() && record.is_owned_by(session_id) {
                    return Ok(Some((condition.clone(), ordinal, record.status)));
                }
            }
        }
        Ok(None)
    }

    /// Expire every `Pending` record in the snapshot whose owner the
    /// liveness oracle reports gone, and drop the freed ordinals from the
    /// snapshot. Losing the expiry CAS just means someone else got there
    /// first; the snapshot keeps the ordinal occupied in that case.
    fn reclaim_stale(
        &self,
        scope: &SlotScope,
        records: &mut BTreeMap<SlotOrdinal, SlotAssignment>,
    ) -> RandomizerResult {
        let stale: Vec<(SlotOrdinal, SessionId)> = records
            .iter()
            .filter(|(_, r)| r.status == AssignmentStatus::Pending)
            .map(|(o, r)| (*o, r.session_id.clone()))
            .collect();
        for (ordinal, owner) in stale {
            if self.liveness.is_expired(&owner)?
                && self.store.mark_expired(scope, ordinal, &owner)?
            {
                debug!(scope = %scope, ordinal, owner = ?owner,
                       "Reclaimed slot from expired session");
                records.remove(&ordinal);
            }
        }
        Ok(())
    }

    /// Assign the session to a slot, or report that every pool is full.
    ///
    /// Pools are visited in a freshly shuffled order so contention does not
    /// systematically favor the first-listed condition. Within a pool the
    /// lowest free ordinal is claimed; a lost claim moves on to the next
    /// pool rather than retrying, which is the documented conservative
    /// policy under heavy races.
    fn assign(&self, session_id: &SessionId) -> RandomizerResult<Option<Condition>> {
        self.check_eligible(session_id)?;

        if let Some((condition, ordinal, status)) = self.existing_assignment(session_id)? {
            debug!(session = ?session_id, condition = %condition, ordinal, status = %status,
                   "Session already holds a slot");
            return Ok(Some(condition));
        }

        let mut order: Vec<usize> = (0..self.pools.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        for index in order {
            let (condition, target) = &self.pools[index];
            let scope = self.scope(condition);

            let mut records: BTreeMap<SlotOrdinal, SlotAssignment> = self
                .store
                .read_all(&scope)?
                .into_iter()
                .filter(|(ordinal, _)| ordinal < target)
                .collect();
            self.reclaim_stale(&scope, &mut records)?;

            let free = (0..*target).find(|ordinal| {
                records
                    .get(ordinal)
                    .map(|r| !r.is_active())
                    .unwrap_or(true)
            });
            let ordinal = match free {
                Some(ordinal) => ordinal,
                // No free ordinal after reclaiming; this pool is full.
                None => continue,
            };

            if self.store.try_claim(&scope, ordinal, session_id)? {
                info!(session = ?session_id, condition = %condition, ordinal,
                      "Assigned session to slot");
                return Ok(Some(condition.clone()));
            }
            // Lost the race for this ordinal; try the next pool.
            debug!(session = ?session_id, condition = %condition, ordinal,
                   "Lost claim race, moving to next condition");
        }

        info!(session = ?session_id, namespace = %self.namespace, "All slot pools are full");
        Ok(None)
    }

    /// Transition the session's own record to `Finished`. A no-op when the
    /// session never received a slot or already finished.
    fn mark_finished(&self, session_id: &SessionId) -> RandomizerResult {
        match self.existing_assignment(session_id)? {
            Some((condition, ordinal, AssignmentStatus::Pending)) => {
                let scope = self.scope(&condition);
                match self.store.mark_finished(&scope, ordinal, session_id) {
                    Ok(()) => Ok(()),
                    // The slot was reclaimed between the scan and the
                    // transition; nothing left to finish.
                    Err(RandomizerError::SlotNotFound { .. }) => {
                        warn!(session = ?session_id, condition = %condition, ordinal,
                              "Slot was reclaimed before the session finished");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Ok(()),
        }
    }

    /// Per-pool counts. A `Pending` record whose owner the oracle reports
    /// expired counts as open, without writing the reclaim.
    fn status(&self) -> RandomizerResult<Vec<PoolStatus>> {
        let mut statuses = Vec::with_capacity(self.pools.len());
        for (condition, target) in &self.pools {
            let scope = self.scope(condition);
            let mut n_pending = 0u32;
            let mut n_finished = 0u32;
            for (ordinal, record) in self.store.read_all(&scope)? {
                if ordinal >= *target {
                    continue;
                }
                match record.status {
                    AssignmentStatus::Pending => {
                        if !self.liveness.is_expired(&record.session_id)? {
                            n_pending += 1;
                        }
                    }
                    AssignmentStatus::Finished => n_finished += 1,
                    AssignmentStatus::Expired => {}
                }
            }
            statuses.push(PoolStatus {
                condition: condition.clone(),
                target: *target,
                n_open: target.saturating_sub(n_pending + n_finished),
                n_pending,
                n_finished,
            });
        }
        Ok(statuses)
    }

    fn is_full(&self) -> RandomizerResult<bool> {
        Ok(self.status()?.iter().all(|s| s.n_open == 0))
    }

    fn all_finished(&self) -> RandomizerResult<bool> {
        Ok(self.status()?.iter().all(|s| s.n_finished == s.target))
    }
}

/// Allocates sessions to experimental conditions from a finite pool of
/// slots, with exact per-condition targets across concurrent, crash-prone
/// sessions sharing one persistent store.
pub struct ListRandomizer {
    pools: SlotPools,
}

impl ListRandomizer {
    pub fn new<N: Into<String>>(
        name: N,
        version: ExperimentVersion,
        conditions: ConditionSet,
        store: Arc<dyn SlotStore>,
        liveness: Arc<dyn SessionLiveness>,
    ) -> RandomizerResult<Self> {
        let pools = conditions
            .iter()
            .map(|(condition, target)| (condition.clone(), target))
            .collect();
        Ok(Self {
            pools: SlotPools::new(name.into(), version, pools, store, liveness)?,
        })
    }

    /// Restrict participation to an explicit set of session ids; any other
    /// session gets `SessionNotEligible` from `assign`.
    pub fn with_allowed_sessions<I: IntoIterator<Item = SessionId>>(mut self, sessions: I) -> Self {
        self.pools.allowed_sessions = Some(sessions.into_iter().collect());
        self
    }

    /// Find or create the session's slot. Idempotent: repeated calls for
    /// the same session return the same condition without re-rolling,
    /// including after the session finished.
    pub fn assign(&self, session_id: &SessionId) -> RandomizerResult<AssignOutcome> {
        Ok(match self.pools.assign(session_id)? {
            Some(condition) => AssignOutcome::Assigned(condition),
            None => AssignOutcome::Full,
        })
    }

    /// Called by the experiment when the session legitimately completes the
    /// randomized portion. No-op if the session never received a slot.
    pub fn mark_finished(&self, session_id: &SessionId) -> RandomizerResult {
        self.pools.mark_finished(session_id)
    }

    pub fn status(&self) -> RandomizerResult<Vec<PoolStatus>> {
        self.pools.status()
    }

    pub fn is_full(&self) -> RandomizerResult<bool> {
        self.pools.is_full()
    }

    pub fn all_finished(&self) -> RandomizerResult<bool> {
        self.pools.all_finished()
    }

    pub fn name(&self) -> &str {
        &self.pools.namespace
    }

    pub fn version(&self) -> &ExperimentVersion {
        &self.pools.version
    }
}

/// Caps the number of participants with a single pool of slots: the same
/// engine as `ListRandomizer` with one implicit condition, so claim and
/// reclaim behavior is identical by construction.
pub struct SessionQuota {
    pools: SlotPools,
}

impl SessionQuota {
    pub fn new<N: Into<String>>(
        name: N,
        version: ExperimentVersion,
        target: u32,
        store: Arc<dyn SlotStore>,
        liveness: Arc<dyn SessionLiveness>,
    ) -> RandomizerResult<Self> {
        if target == 0 {
            fp_bail!(RandomizerError::ZeroTarget {
                condition: QUOTA_POOL_LABEL.to_string(),
            });
        }
        let pools = vec![(Condition::new(QUOTA_POOL_LABEL), target)];
        Ok(Self {
            pools: SlotPools::new(name.into(), version, pools, store, liveness)?,
        })
    }

    pub fn with_allowed_sessions<I: IntoIterator<Item = SessionId>>(mut self, sessions: I) -> Self {
        self.pools.allowed_sessions = Some(sessions.into_iter().collect());
        self
    }

    /// Grant the session one of the pool's slots, or report the quota full.
    /// Idempotent like `ListRandomizer::assign`.
    pub fn assign(&self, session_id: &SessionId) -> RandomizerResult<QuotaOutcome> {
        Ok(match self.pools.assign(session_id)? {
            Some(_) => QuotaOutcome::Granted,
            None => QuotaOutcome::Full,
        })
    }

    pub fn mark_finished(&self, session_id: &SessionId) -> RandomizerResult {
        self.pools.mark_finished(session_id)
    }

    fn pool_status(&self) -> RandomizerResult<PoolStatus> {
        let mut statuses = self.pools.status()?;
        // Constructed with exactly one pool.
        statuses.pop().ok_or(RandomizerError::StorageError {
            error: "quota pool status missing".to_string(),
        })
    }

    pub fn n_open(&self) -> RandomizerResult<u32> {
        Ok(self.pool_status()?.n_open)
    }

    pub fn n_pending(&self) -> RandomizerResult<u32> {
        Ok(self.pool_status()?.n_pending)
    }

    pub fn n_finished(&self) -> RandomizerResult<u32> {
        Ok(self.pool_status()?.n_finished)
    }

    pub fn is_full(&self) -> RandomizerResult<bool> {
        self.pools.is_full()
    }

    pub fn all_finished(&self) -> RandomizerResult<bool> {
        self.pools.all_finished()
    }
}
