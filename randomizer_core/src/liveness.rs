// Copyright (c) 2022, Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use randomizer_types::base_types::SessionId;
use randomizer_types::error::RandomizerResult;

/// Answers whether a session may still come back for its slot.
///
/// Side-effect free and cheap to call; the allocator consults it on every
/// reclaim scan. Backed by the experiment-session store in real
/// deployments.
pub trait SessionLiveness: Send + Sync {
    fn is_expired(&self, session_id: &SessionId) -> RandomizerResult<bool>;
}

struct SessionRecord {
    last_activity: Instant,
    aborted: bool,
    finished: bool,
}

/// In-memory liveness oracle tracking last activity against a timeout,
/// plus explicit abort/finish flags. Sessions the registry has never seen
/// are reported expired, so orphaned slot records are always reclaimable.
pub struct SessionRegistry {
    timeout: Duration,
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register the session or refresh its last-activity timestamp.
    pub fn touch(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.write();
        let record = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionRecord {
                last_activity: Instant::now(),
                aborted: false,
                finished: false,
            });
        record.last_activity = Instant::now();
    }

    /// Mark the session as aborted; it is immediately reclaimable.
    pub fn abort(&self, session_id: &SessionId) {
        self.touch(session_id);
        if let Some(record) = self.sessions.write().get_mut(session_id) {
            record.aborted = true;
        }
    }

    /// Mark the session as legitimately completed. A finished session is
    /// never reported expired, regardless of how old it is.
    pub fn finish(&self, session_id: &SessionId) {
        self.touch(session_id);
        if let Some(record) = self.sessions.write().get_mut(session_id) {
            record.finished = true;
        }
    }
}

impl SessionLiveness for SessionRegistry {
    fn is_expired(&self, session_id: &SessionId) -> RandomizerResult<bool> {
        let sessions = self.sessions.read();
        let expired = match sessions.get(session_id) {
            None => true,
            Some(record) if record.finished => false,
            Some(record) if record.aborted => true,
            Some(record) => record.last_activity.elapsed() > self.timeout,
        };
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_is_expired() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        assert!(registry.is_expired(&SessionId::new("ghost")).unwrap());
    }

    #[test]
    fn test_activity_keeps_session_alive() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let s1 = SessionId::new("s1");
        registry.touch(&s1);
        assert!(!registry.is_expired(&s1).unwrap());
    }

    #[test]
    fn test_timeout_expires_session() {
        let registry = SessionRegistry::new(Duration::from_millis(0));
        let s1 = SessionId::new("s1");
        registry.touch(&s1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(registry.is_expired(&s1).unwrap());
    }

    #[test]
    fn test_abort_and_finish_flags() {
        let registry = SessionRegistry::new(Duration::from_millis(0));
        let aborted = SessionId::new("aborted");
        registry.abort(&aborted);
        assert!(registry.is_expired(&aborted).unwrap());

        // Finished beats both the flag ordering and the timeout.
        let finished = SessionId::new("finished");
        registry.finish(&finished);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!registry.is_expired(&finished).unwrap());
    }
}
