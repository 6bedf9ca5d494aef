//! Connection registry for Haven.
//!
//! Maps a live transport session to its client-declared identity. Entries
//! exist only for the lifetime of the connection and are never persisted.

use std::collections::HashMap;
use tracing::debug;

/// A connection identifier, assigned by the transport layer.
pub type ConnectionId = String;

/// Identity attached to one live transport session.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Transport-assigned connection identifier.
    pub connection_id: ConnectionId,
    /// User identifier (client-declared, unverified).
    pub user_id: String,
    /// Display name (client-declared).
    pub display_name: String,
    /// Registration order, used to break duplicate-login ties.
    seq: u64,
}

/// Registry of live connections and their declared identities.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, Connection>,
    next_seq: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-register a connection's identity. Overwrites any
    /// prior entry for the same connection id; always succeeds.
    pub fn register(
        &mut self,
        connection_id: impl Into<ConnectionId>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) {
        let connection_id = connection_id.into();
        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = Connection {
            connection_id: connection_id.clone(),
            user_id: user_id.into(),
            display_name: display_name.into(),
            seq,
        };
        debug!(connection = %connection_id, user = %entry.user_id, "Connection registered");
        self.entries.insert(connection_id, entry);
    }

    /// Look up a connection by its id.
    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&Connection> {
        self.entries.get(connection_id)
    }

    /// Look up the connection for a user id.
    ///
    /// There is no secondary index; this is a linear scan. If the same user
    /// id is registered on several connections, the most recent
    /// registration wins.
    #[must_use]
    pub fn lookup_by_user(&self, user_id: &str) -> Option<&Connection> {
        self.entries
            .values()
            .filter(|c| c.user_id == user_id)
            .max_by_key(|c| c.seq)
    }

    /// Remove a connection. No error if absent.
    pub fn remove(&mut self, connection_id: &str) -> Option<Connection> {
        let removed = self.entries.remove(connection_id);
        if removed.is_some() {
            debug!(connection = %connection_id, "Connection removed");
        }
        removed
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ConnectionRegistry::new();
        registry.register("conn-1", "alice", "Alice");

        let conn = registry.get("conn-1").unwrap();
        assert_eq!(conn.user_id, "alice");
        assert_eq!(conn.display_name, "Alice");

        assert!(registry.get("conn-2").is_none());
    }

    #[test]
    fn test_register_is_upsert() {
        let mut registry = ConnectionRegistry::new();
        registry.register("conn-1", "alice", "Alice");
        registry.register("conn-1", "alice", "Alice B.");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("conn-1").unwrap().display_name, "Alice B.");
    }

    #[test]
    fn test_lookup_by_user_most_recent_wins() {
        let mut registry = ConnectionRegistry::new();
        registry.register("conn-1", "alice", "Alice");
        registry.register("conn-2", "alice", "Alice");

        // Duplicate login resolves to the newest connection.
        assert_eq!(
            registry.lookup_by_user("alice").unwrap().connection_id,
            "conn-2"
        );

        registry.remove("conn-2");
        assert_eq!(
            registry.lookup_by_user("alice").unwrap().connection_id,
            "conn-1"
        );
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.remove("conn-1").is_none());
        registry.register("conn-1", "alice", "Alice");
        assert!(registry.remove("conn-1").is_some());
        assert!(registry.is_empty());
    }
}
