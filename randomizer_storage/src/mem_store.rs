// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use randomizer_types::base_types::{
    AssignmentStatus, SessionId, SlotAssignment, SlotOrdinal, SlotScope,
};
use randomizer_types::error::{RandomizerError, RandomizerResult};

use crate::slot_store::{now_millis, SlotStore};

/// In-memory slot store for tests and single-process deployments.
///
/// The write lock over the whole map is the conditional-write primitive:
/// every `try_claim` checks and inserts under one guard, so two sessions
/// can never both see the same ordinal as free.
#[derive(Default)]
pub struct InMemorySlotStore {
    slots: RwLock<BTreeMap<SlotScope, BTreeMap<SlotOrdinal, SlotAssignment>>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for InMemorySlotStore {
    fn read_all(&self, scope: &SlotScope) -> RandomizerResult<Vec<(SlotOrdinal, SlotAssignment)>> {
        let slots = self.slots.read();
        Ok(slots
            .get(scope)
            .map(|pool| pool.iter().map(|(o, r)| (*o, r.clone())).collect())
            .unwrap_or_default())
    }

    fn try_claim(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        session_id: &SessionId,
    ) -> RandomizerResult<bool> {
        let mut slots = self.slots.write();
        let pool = slots.entry(scope.clone()).or_default();
        if let Some(current) = pool.get(&ordinal) {
            if current.is_active() {
                debug!(scope = %scope, ordinal, occupant = ?current.session_id,
                       "Claim conflict, ordinal already active");
                return Ok(false);
            }
        }
        pool.insert(
            ordinal,
            SlotAssignment::new_pending(session_id.clone(), now_millis()),
        );
        Ok(true)
    }

    fn mark_finished(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        owner: &SessionId,
    ) -> RandomizerResult<()> {
        let mut slots = self.slots.write();
        let record = slots
            .get_mut(scope)
            .and_then(|pool| pool.get_mut(&ordinal))
            .filter(|r| r.is_owned_by(owner) && r.is_active())
            .ok_or(RandomizerError::SlotNotFound { ordinal })?;
        record.status = AssignmentStatus::Finished;
        Ok(())
    }

    fn mark_expired(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        owner: &SessionId,
    ) -> RandomizerResult<bool> {
        let mut slots = self.slots.write();
        let record = slots.get_mut(scope).and_then(|pool| pool.get_mut(&ordinal));
        match record {
            Some(r) if r.is_owned_by(owner) && r.status == AssignmentStatus::Pending => {
                r.status = AssignmentStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
