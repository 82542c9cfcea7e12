// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! RocksDB-backed slot store.
//!
//! Records live in one column family keyed by the bcs-encoded scope followed
//! by the big-endian ordinal, so all records of a scope form one contiguous
//! key range and `read_all` is a prefix scan. Claim and transition
//! operations run inside a sharded critical region: testing the current
//! record and writing the new one must be atomic, and no other write to the
//! same scope may happen in between.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use tracing::debug;

use randomizer_types::base_types::{
    AssignmentStatus, SessionId, SlotAssignment, SlotOrdinal, SlotScope,
};
use randomizer_types::error::{RandomizerError, RandomizerResult};

use crate::slot_store::{now_millis, SlotStore};

const CF_SLOT_ASSIGNMENTS: &str = "slot_assignments";
const NUM_LOCK_SHARDS: usize = 1024;

pub struct RocksSlotStore {
    db: DB,
    /// Internal vector of locks to serialize conditional writes per scope.
    lock_table: Vec<Mutex<()>>,
}

impl RocksSlotStore {
    /// Open or create the slot database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, db_options: Option<Options>) -> RandomizerResult<Self> {
        let mut options = db_options.unwrap_or_default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let mut point_lookup = Options::default();
        point_lookup.optimize_for_point_lookup(1024 * 1024);

        let db = DB::open_cf_descriptors(
            &options,
            path,
            vec![ColumnFamilyDescriptor::new(CF_SLOT_ASSIGNMENTS, point_lookup)],
        )
        .map_err(|e| RandomizerError::StorageError {
            error: e.to_string(),
        })?;

        Ok(Self {
            db,
            lock_table: (0..NUM_LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        })
    }

    fn cf(&self) -> RandomizerResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_SLOT_ASSIGNMENTS)
            .ok_or_else(|| RandomizerError::StorageError {
                error: format!("missing column family {CF_SLOT_ASSIGNMENTS}"),
            })
    }

    /// Guard for the critical region of one scope. Distinct scopes may map
    /// to the same shard; that only costs throughput, never correctness.
    fn scope_lock(&self, scope: &SlotScope) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        scope.hash(&mut hasher);
        let shard = (hasher.finish() as usize) % self.lock_table.len();
        self.lock_table[shard].lock()
    }

    fn scope_prefix(scope: &SlotScope) -> RandomizerResult<Vec<u8>> {
        bcs::to_bytes(scope).map_err(|e| RandomizerError::SlotSerializationError {
            error: e.to_string(),
        })
    }

    fn slot_key(scope: &SlotScope, ordinal: SlotOrdinal) -> RandomizerResult<Vec<u8>> {
        let mut key = Self::scope_prefix(scope)?;
        key.extend_from_slice(&ordinal.to_be_bytes());
        Ok(key)
    }

    fn get_record(&self, key: &[u8]) -> RandomizerResult<Option<SlotAssignment>> {
        let bytes = self
            .db
            .get_cf(self.cf()?, key)
            .map_err(|e| RandomizerError::StorageError {
                error: e.to_string(),
            })?;
        bytes
            .map(|b| {
                bcs::from_bytes(&b).map_err(|e| RandomizerError::SlotSerializationError {
                    error: e.to_string(),
                })
            })
            .transpose()
    }

    fn put_record(&self, key: &[u8], record: &SlotAssignment) -> RandomizerResult {
        let bytes = bcs::to_bytes(record).map_err(|e| RandomizerError::SlotSerializationError {
            error: e.to_string(),
        })?;
        self.db
            .put_cf(self.cf()?, key, bytes)
            .map_err(|e| RandomizerError::StorageError {
                error: e.to_string(),
            })
    }
}

impl SlotStore for RocksSlotStore {
    fn read_all(&self, scope: &SlotScope) -> RandomizerResult<Vec<(SlotOrdinal, SlotAssignment)>> {
        let prefix = Self::scope_prefix(scope)?;
        let mut records = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf()?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for item in iter {
            let (key, value) = item.map_err(|e| RandomizerError::StorageError {
                error: e.to_string(),
            })?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Big-endian ordinals keep the range sorted numerically.
            let ordinal_bytes: [u8; 4] = key[prefix.len()..].try_into().map_err(|_| {
                RandomizerError::SlotSerializationError {
                    error: format!("malformed slot key in scope {scope}"),
                }
            })?;
            let record: SlotAssignment = bcs::from_bytes(&value).map_err(|e| {
                RandomizerError::SlotSerializationError {
                    error: e.to_string(),
                }
            })?;
            records.push((u32::from_be_bytes(ordinal_bytes), record));
        }
        Ok(records)
    }

    fn try_claim(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        session_id: &SessionId,
    ) -> RandomizerResult<bool> {
        let key = Self::slot_key(scope, ordinal)?;
        let _guard = self.scope_lock(scope);
        if let Some(current) = self.get_record(&key)? {
            if current.is_active() {
                debug!(scope = %scope, ordinal, occupant = ?current.session_id,
                       "Claim conflict, ordinal already active");
                return Ok(false);
            }
        }
        self.put_record(
            &key,
            &SlotAssignment::new_pending(session_id.clone(), now_millis()),
        )?;
        Ok(true)
    }

    fn mark_finished(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        owner: &SessionId,
    ) -> RandomizerResult<()> {
        let key = Self::slot_key(scope, ordinal)?;
        let _guard = self.scope_lock(scope);
        let mut record = self
            .get_record(&key)?
            .filter(|r| r.is_owned_by(owner) && r.is_active())
            .ok_or(RandomizerError::SlotNotFound { ordinal })?;
        if record.status == AssignmentStatus::Finished {
            return Ok(());
        }
        record.status = AssignmentStatus::Finished;
        self.put_record(&key, &record)
    }

    fn mark_expired(
        &self,
        scope: &SlotScope,
        ordinal: SlotOrdinal,
        owner: &SessionId,
    ) -> RandomizerResult<bool> {
        let key = Self::slot_key(scope, ordinal)?;
        let _guard = self.scope_lock(scope);
        match self.get_record(&key)? {
            Some(mut record)
                if record.is_owned_by(owner) && record.status == AssignmentStatus::Pending =>
            {
                record.status = AssignmentStatus::Expired;
                self.put_record(&key, &record)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use randomizer_types::base_types::{Condition, ExperimentVersion};

    fn init_store(dir: &Path) -> RocksSlotStore {
        RocksSlotStore::open(dir, None).expect("Could not create slot DB")
    }

    fn scope(pool: &str) -> SlotScope {
        SlotScope::new("rand", ExperimentVersion::from("1"), Condition::new(pool))
    }

    #[test]
    fn test_claim_conflict_and_reclaim() {
        let dir = tempfile::tempdir().unwrap();
        let store = init_store(dir.path());
        let sc = scope("a");
        let s1 = SessionId::new("s1");
        let s2 = SessionId::new("s2");

        assert!(store.try_claim(&sc, 0, &s1).unwrap());
        assert!(!store.try_claim(&sc, 0, &s2).unwrap());

        assert!(store.mark_expired(&sc, 0, &s1).unwrap());
        assert!(store.try_claim(&sc, 0, &s2).unwrap());

        // Stale reclaim against the old owner loses.
        assert!(!store.mark_expired(&sc, 0, &s1).unwrap());

        let records = store.read_all(&sc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.session_id, s2);
    }

    #[test]
    fn test_finished_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let store = init_store(dir.path());
        let sc = scope("a");
        let s1 = SessionId::new("s1");

        assert!(store.try_claim(&sc, 1, &s1).unwrap());
        store.mark_finished(&sc, 1, &s1).unwrap();
        store.mark_finished(&sc, 1, &s1).unwrap();

        assert!(!store.mark_expired(&sc, 1, &s1).unwrap());
        assert!(!store.try_claim(&sc, 1, &SessionId::new("s2")).unwrap());
    }

    #[test]
    fn test_read_all_is_ordered_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = init_store(dir.path());
        let s1 = SessionId::new("s1");

        // Similar pool labels must not bleed into each other's prefix scans.
        for ordinal in [2u32, 0, 1] {
            assert!(store.try_claim(&scope("a"), ordinal, &s1).unwrap());
        }
        assert!(store.try_claim(&scope("ab"), 7, &s1).unwrap());

        let ordinals: Vec<u32> = store
            .read_all(&scope("a"))
            .unwrap()
            .into_iter()
            .map(|(o, _)| o)
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(store.read_all(&scope("ab")).unwrap().len(), 1);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let sc = scope("a");
        let s1 = SessionId::new("s1");
        {
            let store = init_store(dir.path());
            assert!(store.try_claim(&sc, 0, &s1).unwrap());
            store.mark_finished(&sc, 0, &s1).unwrap();
        }

        let store = init_store(dir.path());
        let records = store.read_all(&sc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.status, AssignmentStatus::Finished);
        assert!(!store.try_claim(&sc, 0, &SessionId::new("s2")).unwrap());
    }

    #[test]
    fn test_version_bump_isolates_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = init_store(dir.path());
        let s1 = SessionId::new("s1");

        assert!(store.try_claim(&scope("a"), 0, &s1).unwrap());

        let v2 = SlotScope::new("rand", ExperimentVersion::from("2"), Condition::new("a"));
        assert!(store.read_all(&v2).unwrap().is_empty());
        assert!(store.try_claim(&v2, 0, &SessionId::new("s2")).unwrap());
        assert_eq!(store.read_all(&scope("a")).unwrap()[0].1.session_id, s1);
    }
}
