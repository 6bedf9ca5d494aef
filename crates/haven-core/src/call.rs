//! Call registry and state machine for Haven.
//!
//! A call is a transient voice/video negotiation between two users. It is
//! keyed by user ids rather than connection ids so a participant may
//! reconnect mid-call; the dispatcher re-resolves user -> connection at
//! signaling time.

use haven_protocol::CallId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Atomic counter ensuring generated ids are never reused within a process.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Generate a unique identifier with the given prefix.
///
/// Combines the current timestamp with a monotonic counter, so an id that
/// has been removed can never collide with a future one.
#[must_use]
pub fn unique_id(prefix: &str) -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{counter}", now_millis())
}

/// Call status. Removal is not a status; a removed call is deleted from
/// the registry and its id never referenced again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// Offered to the callee, not yet answered.
    Initiating,
    /// Accepted by the callee.
    Active,
}

/// A live call record.
#[derive(Debug, Clone)]
pub struct Call {
    /// Server-generated unique identifier.
    pub call_id: CallId,
    /// Room the call was started from.
    pub chat_id: String,
    /// Caller user id.
    pub caller_id: String,
    /// Callee user id.
    pub callee_id: String,
    /// Media type tag, e.g. `"audio"` or `"video"`.
    pub media_type: String,
    /// Current status.
    pub status: CallStatus,
    /// Start timestamp in milliseconds.
    pub started_at: u64,
}

impl Call {
    /// The participant other than `user_id`.
    #[must_use]
    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.caller_id == user_id {
            &self.callee_id
        } else {
            &self.caller_id
        }
    }

    /// Check if a user is one of the two participants.
    #[must_use]
    pub fn involves(&self, user_id: &str) -> bool {
        self.caller_id == user_id || self.callee_id == user_id
    }
}

/// Registry of live calls.
#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: HashMap<CallId, Call>,
}

impl CallRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created call record.
    pub fn insert(&mut self, call: Call) {
        debug!(call = %call.call_id, caller = %call.caller_id, callee = %call.callee_id, "Call created");
        self.calls.insert(call.call_id.clone(), call);
    }

    /// Look up a call by id.
    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<&Call> {
        self.calls.get(call_id)
    }

    /// Transition a call to `Active`.
    ///
    /// Returns `false` if the call is unknown.
    pub fn set_active(&mut self, call_id: &str) -> bool {
        if let Some(call) = self.calls.get_mut(call_id) {
            call.status = CallStatus::Active;
            debug!(call = %call_id, "Call active");
            true
        } else {
            false
        }
    }

    /// Remove a call. No error if absent.
    pub fn remove(&mut self, call_id: &str) -> Option<Call> {
        let removed = self.calls.remove(call_id);
        if removed.is_some() {
            debug!(call = %call_id, "Call removed");
        }
        removed
    }

    /// Ids of every call a user participates in, as caller or callee.
    #[must_use]
    pub fn calls_involving(&self, user_id: &str) -> Vec<CallId> {
        self.calls
            .values()
            .filter(|call| call.involves(user_id))
            .map(|call| call.call_id.clone())
            .collect()
    }

    /// Remove every call still `Initiating` after `timeout`.
    ///
    /// Silent expiry: neither party is notified. Active calls are never
    /// touched.
    pub fn reap(&mut self, now_ms: u64, timeout: Duration) -> Vec<Call> {
        let timeout_ms = timeout.as_millis() as u64;
        let stale: Vec<CallId> = self
            .calls
            .values()
            .filter(|call| {
                call.status == CallStatus::Initiating
                    && now_ms.saturating_sub(call.started_at) > timeout_ms
            })
            .map(|call| call.call_id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| {
                debug!(call = %id, "Reaped stale call");
                self.calls.remove(id)
            })
            .collect()
    }

    /// Number of live calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Check if there are no live calls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, status: CallStatus, started_at: u64) -> Call {
        Call {
            call_id: id.to_string(),
            chat_id: "r1".to_string(),
            caller_id: "alice".to_string(),
            callee_id: "bob".to_string(),
            media_type: "video".to_string(),
            status,
            started_at,
        }
    }

    #[test]
    fn test_unique_ids() {
        let a = unique_id("call");
        let b = unique_id("call");
        assert_ne!(a, b);
        assert!(a.starts_with("call_"));
    }

    #[test]
    fn test_lifecycle() {
        let mut registry = CallRegistry::new();
        registry.insert(call("c1", CallStatus::Initiating, 0));

        assert!(registry.set_active("c1"));
        assert_eq!(registry.get("c1").unwrap().status, CallStatus::Active);

        assert!(registry.remove("c1").is_some());
        // Removed calls are unreachable by further operations.
        assert!(!registry.set_active("c1"));
        assert!(registry.remove("c1").is_none());
    }

    #[test]
    fn test_other_participant() {
        let c = call("c1", CallStatus::Active, 0);
        assert_eq!(c.other_participant("alice"), "bob");
        assert_eq!(c.other_participant("bob"), "alice");
    }

    #[test]
    fn test_calls_involving() {
        let mut registry = CallRegistry::new();
        registry.insert(call("c1", CallStatus::Initiating, 0));
        registry.insert(call("c2", CallStatus::Active, 0));

        assert_eq!(registry.calls_involving("alice").len(), 2);
        assert_eq!(registry.calls_involving("bob").len(), 2);
        assert!(registry.calls_involving("carol").is_empty());
    }

    #[test]
    fn test_reap_only_stale_initiating() {
        let mut registry = CallRegistry::new();
        registry.insert(call("stale", CallStatus::Initiating, 1_000));
        registry.insert(call("fresh", CallStatus::Initiating, 90_000));
        registry.insert(call("active", CallStatus::Active, 1_000));

        let reaped = registry.reap(100_000, Duration::from_millis(60_000));
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].call_id, "stale");

        assert!(registry.get("stale").is_none());
        assert!(registry.get("fresh").is_some());
        assert!(registry.get("active").is_some());
    }
}
