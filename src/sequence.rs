//! Per-sender sequence tracking run by the server on every echo.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Outcome of recording one ping.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceCheck {
    /// True iff the ping's sequence matches the server's count after the update.
    pub success: bool,
    pub client_sequence: i64,
    pub server_sequence: i64,
}

struct SenderState {
    sequence: i64,
    last_seen: Instant,
}

/// Last accepted sequence per sender identity.
///
/// The map is only reachable through [`record`](Self::record), which does the
/// whole read-modify-write under one lock. Senders are kept for the tracker's
/// lifetime unless an idle timeout is configured.
pub struct SequenceTracker {
    senders: Mutex<HashMap<String, SenderState>>,
    idle_timeout: Option<Duration>,
}

impl SequenceTracker {
    /// Tracker that never forgets a sender.
    pub fn new() -> Self {
        SequenceTracker {
            senders: Mutex::new(HashMap::new()),
            idle_timeout: None,
        }
    }

    /// Tracker whose [`evict_idle`](Self::evict_idle) drops senders silent for
    /// longer than `timeout`.
    pub fn with_idle_timeout(timeout: Duration) -> Self {
        SequenceTracker {
            senders: Mutex::new(HashMap::new()),
            idle_timeout: Some(timeout),
        }
    }

    /// Idle period after which senders are evicted, if any.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SenderState>> {
        // Updates cannot leave the map half-written, so a poisoned lock is still usable.
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a ping from `sender` carrying `client_sequence` and checks its order.
    ///
    /// A sequence of 1 restarts the sender's count at 1. Any other value advances
    /// the count by exactly one, whatever the value is, so a gap or a duplicate
    /// shows up as a mismatch.
    pub fn record(&self, sender: &str, client_sequence: i64) -> SequenceCheck {
        let now = Instant::now();
        let mut senders = self.lock();

        let state = senders
            .entry(sender.to_string())
            .or_insert(SenderState {
                sequence: 0,
                last_seen: now,
            });

        if client_sequence == 1 {
            state.sequence = 1;
        } else {
            state.sequence += 1;
        }
        state.last_seen = now;

        SequenceCheck {
            success: client_sequence == state.sequence,
            client_sequence,
            server_sequence: state.sequence,
        }
    }

    /// Current count for `sender`, if it has been seen.
    pub fn current(&self, sender: &str) -> Option<i64> {
        self.lock().get(sender).map(|state| state.sequence)
    }

    /// Number of senders currently tracked.
    pub fn sender_count(&self) -> usize {
        self.lock().len()
    }

    /// Drops senders idle past the timeout; returns how many were removed.
    /// Without a timeout this is a no-op.
    pub fn evict_idle(&self) -> usize {
        let Some(timeout) = self.idle_timeout else {
            return 0;
        };

        let mut senders = self.lock();
        let before = senders.len();
        senders.retain(|_, state| state.last_seen.elapsed() <= timeout);
        before - senders.len()
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
