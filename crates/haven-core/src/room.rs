//! Room membership index for Haven.
//!
//! Rooms are named sets of connections viewing the same chat thread. They
//! are created lazily on first join and evicted as soon as the last member
//! leaves, so an empty room is indistinguishable from an absent one.

use haven_protocol::ChatId;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::connection::ConnectionId;

/// Index of room membership, with a reverse map for disconnect cleanup.
#[derive(Debug, Default)]
pub struct RoomIndex {
    /// Room id -> member connection ids.
    rooms: HashMap<ChatId, HashSet<ConnectionId>>,
    /// Connection id -> rooms joined.
    memberships: HashMap<ConnectionId, HashSet<ChatId>>,
}

impl RoomIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room lazily.
    ///
    /// Returns `true` if membership changed (re-joins are no-ops).
    pub fn join(&mut self, room_id: impl Into<ChatId>, connection_id: impl Into<ConnectionId>) -> bool {
        let room_id = room_id.into();
        let connection_id = connection_id.into();

        let added = self
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id.clone());
        if added {
            self.memberships
                .entry(connection_id.clone())
                .or_default()
                .insert(room_id.clone());
            debug!(room = %room_id, connection = %connection_id, "Joined room");
        }
        added
    }

    /// Remove a connection from a room. Does nothing if the room or member
    /// is absent; evicts the room once its last member leaves.
    ///
    /// Returns `true` if membership changed.
    pub fn leave(&mut self, room_id: &str, connection_id: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(connection_id);
        if removed {
            if members.is_empty() {
                self.rooms.remove(room_id);
                debug!(room = %room_id, "Evicted empty room");
            }
            if let Some(joined) = self.memberships.get_mut(connection_id) {
                joined.remove(room_id);
                if joined.is_empty() {
                    self.memberships.remove(connection_id);
                }
            }
            debug!(room = %room_id, connection = %connection_id, "Left room");
        }
        removed
    }

    /// Member connection ids of a room. Empty if the room does not exist.
    #[must_use]
    pub fn member_ids(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection has joined.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &str) -> Vec<ChatId> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a connection from every room it joined.
    ///
    /// Returns the rooms it was removed from.
    pub fn remove_connection(&mut self, connection_id: &str) -> Vec<ChatId> {
        let rooms = self.rooms_of(connection_id);
        for room_id in &rooms {
            self.leave(room_id, connection_id);
        }
        rooms
    }

    /// Number of live rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Check if there are no rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
