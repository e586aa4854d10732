//! Per-session drill-down state

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use cubeql_compiler::{DrillKey, DrillState};
use tracing::debug;

use crate::config::SessionConfig;

struct Session {
    state: DrillState,
    touched: Instant,
    /// Recency order; larger is more recent
    sequence: u64,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    sequence: u64,
}

impl Sessions {
    fn evict_idle(&mut self, now: Instant, idle_timeout: Duration) {
        let before = self.by_id.len();
        self.by_id
            .retain(|_, session| now.duration_since(session.touched) < idle_timeout);
        let evicted = before - self.by_id.len();
        if evicted > 0 {
            debug!(evicted, "Dropped idle drill sessions");
        }
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .by_id
            .iter()
            .min_by_key(|(_, session)| session.sequence)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            debug!(session = %id, "Evicted least recently used drill session");
            self.by_id.remove(&id);
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Drill states keyed by caller-supplied session id, bounded in count and idle time
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::from_config(&SessionConfig::default())
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::with_limits(config.max_sessions, config.idle_timeout())
    }

    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    /// Toggle `key` in the session's state. Returns whether it is now expanded
    /// and how many keys the session holds.
    pub fn toggle(&self, session: &str, key: DrillKey) -> (bool, usize) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.evict_idle(now, self.idle_timeout);
        if !sessions.by_id.contains_key(session) && sessions.by_id.len() >= self.max_sessions {
            sessions.evict_least_recent();
        }

        let sequence = sessions.next_sequence();
        let entry = sessions
            .by_id
            .entry(session.to_string())
            .or_insert_with(|| Session {
                state: DrillState::new(),
                touched: now,
                sequence,
            });
        entry.touched = now;
        entry.sequence = sequence;
        let expanded = entry.state.toggle(key);
        let len = entry.state.len();
        if entry.state.is_empty() {
            sessions.by_id.remove(session);
        }
        (expanded, len)
    }

    /// Copy of the session's state; empty for unknown or expired sessions.
    /// Reading counts as use.
    pub fn state(&self, session: &str) -> DrillState {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.evict_idle(now, self.idle_timeout);
        let sequence = sessions.next_sequence();
        match sessions.by_id.get_mut(session) {
            Some(entry) => {
                entry.touched = now;
                entry.sequence = sequence;
                entry.state.clone()
            }
            None => DrillState::new(),
        }
    }

    /// Forget a session. Returns whether it existed.
    pub fn reset(&self, session: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.by_id.remove(session).is_some()
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.by_id.len()
    }
}
