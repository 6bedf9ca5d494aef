//! Signaling dispatcher for Haven.
//!
//! The dispatcher owns the three registries and turns one inbound client
//! event into registry mutations plus a list of outbound deliveries. It is
//! transport-free: the caller performs the actual sends, which keeps every
//! handler deterministic and unit-testable with fresh state.
//!
//! Error policy is deliberately lenient: unknown call ids, rooms, and
//! connections are silent no-ops, and an unreachable peer simply drops the
//! notification. The only surfaced failure is `call-failed` on initiate.

use haven_protocol::{CallAnswer, ClientEvent, RoomMember, ServerEvent};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::call::{now_millis, unique_id, Call, CallRegistry, CallStatus};
use crate::connection::{ConnectionId, ConnectionRegistry};
use crate::room::RoomIndex;

/// An outbound event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Target connection id.
    pub target: ConnectionId,
    /// Event to send.
    pub event: ServerEvent,
}

impl Delivery {
    fn new(target: impl Into<ConnectionId>, event: ServerEvent) -> Self {
        Self {
            target: target.into(),
            event,
        }
    }
}

/// Counters for the dispatcher's registries.
#[derive(Debug, Clone, Copy)]
pub struct SignalingStats {
    /// Registered connections.
    pub connections: usize,
    /// Live rooms.
    pub rooms: usize,
    /// Live calls.
    pub calls: usize,
}

/// The signaling state: connection registry, room index, and call registry.
///
/// Constructed once at process start and threaded through the transport
/// layer behind a single lock; every dispatch step assumes exclusive
/// access, which the lock preserves on a multi-threaded runtime.
#[derive(Debug, Default)]
pub struct SignalingState {
    connections: ConnectionRegistry,
    rooms: RoomIndex,
    calls: CallRegistry,
}

impl SignalingState {
    /// Create empty signaling state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get registry counters.
    #[must_use]
    pub fn stats(&self) -> SignalingStats {
        SignalingStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
            calls: self.calls.len(),
        }
    }

    /// Process one inbound event from `connection_id`.
    ///
    /// Returns the deliveries the transport layer must fan out. Every
    /// broadcast reflects the mutation made in the same step; there is no
    /// eventual-consistency window.
    pub fn dispatch(&mut self, connection_id: &str, event: ClientEvent) -> Vec<Delivery> {
        match event {
            ClientEvent::JoinUser {
                user_id,
                display_name,
            } => {
                self.connections
                    .register(connection_id, user_id.clone(), display_name.clone());
                vec![Delivery::new(
                    connection_id,
                    ServerEvent::UserConnected {
                        user_id,
                        display_name,
                    },
                )]
            }

            ClientEvent::JoinChat { chat_id } => {
                // Broadcast even when the membership set did not change:
                // clients use join-chat as a roster refresh after
                // navigating back to a thread.
                self.rooms.join(chat_id.clone(), connection_id);
                self.broadcast_roster(&chat_id)
            }

            ClientEvent::LeaveChat { chat_id } => {
                if self.rooms.leave(&chat_id, connection_id) {
                    self.broadcast_roster(&chat_id)
                } else {
                    Vec::new()
                }
            }

            ClientEvent::SendMessage {
                chat_id,
                mut message,
            } => {
                stamp_server_timestamp(&mut message);
                self.broadcast(
                    &chat_id,
                    &ServerEvent::ReceiveMessage {
                        chat_id: chat_id.clone(),
                        message,
                    },
                    None,
                )
            }

            ClientEvent::Typing {
                chat_id,
                from,
                is_typing,
            } => self.broadcast(
                &chat_id,
                &ServerEvent::Typing {
                    chat_id: chat_id.clone(),
                    from,
                    is_typing,
                },
                Some(connection_id),
            ),

            ClientEvent::MessageStatus {
                chat_id,
                message_id,
                status,
            } => self.broadcast(
                &chat_id,
                &ServerEvent::MessageStatus {
                    chat_id: chat_id.clone(),
                    message_id,
                    status,
                },
                None,
            ),

            ClientEvent::GetOnlineUsers { chat_id } => {
                let users = self.roster(&chat_id);
                vec![Delivery::new(
                    connection_id,
                    ServerEvent::OnlineUsers { chat_id, users },
                )]
            }

            ClientEvent::InitiateCall {
                chat_id,
                caller_id,
                callee_id,
                media_type,
            } => self.initiate_call(connection_id, chat_id, caller_id, callee_id, media_type),

            ClientEvent::CallResponse {
                call_id,
                response,
                user_id,
            } => self.respond_to_call(&call_id, response, &user_id),

            ClientEvent::EndCall { call_id, user_id } => self.end_call(&call_id, &user_id),

            ClientEvent::SendFile {
                chat_id,
                from,
                file_name,
                file_type,
                file_size,
                file_data,
                timestamp,
            } => {
                let message = json!({
                    "id": unique_id("msg"),
                    "from": from,
                    "type": "file",
                    "fileName": file_name,
                    "fileType": file_type,
                    "fileSize": file_size,
                    "fileData": file_data,
                    "timestamp": timestamp,
                    "serverTimestamp": now_millis(),
                });
                self.broadcast(
                    &chat_id,
                    &ServerEvent::ReceiveMessage {
                        chat_id: chat_id.clone(),
                        message,
                    },
                    None,
                )
            }
        }
    }

    /// Handle a transport-level disconnect.
    ///
    /// Removes the connection, leaves every joined room (broadcasting the
    /// shrunken roster to the remaining members), and ends every call the
    /// user participated in.
    pub fn disconnect(&mut self, connection_id: &str) -> Vec<Delivery> {
        let removed = self.connections.remove(connection_id);
        let mut deliveries = Vec::new();

        for room_id in self.rooms.remove_connection(connection_id) {
            deliveries.extend(self.broadcast_roster(&room_id));
        }

        if let Some(connection) = removed {
            for call_id in self.calls.calls_involving(&connection.user_id) {
                if let Some(call) = self.calls.remove(&call_id) {
                    let other = call.other_participant(&connection.user_id).to_string();
                    if let Some(peer) = self.connections.lookup_by_user(&other) {
                        deliveries.push(Delivery::new(
                            peer.connection_id.clone(),
                            ServerEvent::call_ended_with_reason(
                                call.call_id,
                                connection.user_id.clone(),
                                "user disconnected",
                            ),
                        ));
                    }
                }
            }
            debug!(connection = %connection_id, user = %connection.user_id, "Disconnected");
        }

        deliveries
    }

    /// Remove calls stuck in `Initiating` past `timeout`. Silent expiry;
    /// returns the number of calls removed.
    pub fn reap_stale_calls(&mut self, now_ms: u64, timeout: Duration) -> usize {
        self.calls.reap(now_ms, timeout).len()
    }

    fn initiate_call(
        &mut self,
        connection_id: &str,
        chat_id: String,
        caller_id: String,
        callee_id: String,
        media_type: String,
    ) -> Vec<Delivery> {
        // Resolve the callee before committing the record, so a failed
        // initiate leaves nothing behind for the reaper.
        let Some(callee) = self.connections.lookup_by_user(&callee_id) else {
            return vec![Delivery::new(
                connection_id,
                ServerEvent::call_failed("User not online"),
            )];
        };
        let callee_conn = callee.connection_id.clone();

        let caller_name = self
            .connections
            .lookup_by_user(&caller_id)
            .map(|c| c.display_name.clone())
            .unwrap_or_else(|| caller_id.clone());

        let call_id = unique_id("call");
        self.calls.insert(Call {
            call_id: call_id.clone(),
            chat_id: chat_id.clone(),
            caller_id: caller_id.clone(),
            callee_id,
            media_type: media_type.clone(),
            status: CallStatus::Initiating,
            started_at: now_millis(),
        });

        vec![Delivery::new(
            callee_conn,
            ServerEvent::IncomingCall {
                call_id,
                chat_id,
                caller_id,
                caller_name,
                media_type,
            },
        )]
    }

    fn respond_to_call(
        &mut self,
        call_id: &str,
        response: CallAnswer,
        responder_id: &str,
    ) -> Vec<Delivery> {
        let Some(call) = self.calls.get(call_id) else {
            return Vec::new();
        };
        let caller_id = call.caller_id.clone();

        match response {
            CallAnswer::Accept => {
                self.calls.set_active(call_id);
                // If the caller dropped meanwhile the accept has no
                // recipient, which is fine.
                self.connections
                    .lookup_by_user(&caller_id)
                    .map(|caller| {
                        vec![Delivery::new(
                            caller.connection_id.clone(),
                            ServerEvent::CallAccepted {
                                call_id: call_id.to_string(),
                                callee_id: responder_id.to_string(),
                            },
                        )]
                    })
                    .unwrap_or_default()
            }
            CallAnswer::Reject => {
                let deliveries = self
                    .connections
                    .lookup_by_user(&caller_id)
                    .map(|caller| {
                        vec![Delivery::new(
                            caller.connection_id.clone(),
                            ServerEvent::CallRejected {
                                call_id: call_id.to_string(),
                                reason: "user declined".to_string(),
                            },
                        )]
                    })
                    .unwrap_or_default();
                // Deleted even when the caller is unreachable.
                self.calls.remove(call_id);
                deliveries
            }
        }
    }

    fn end_call(&mut self, call_id: &str, ending_user_id: &str) -> Vec<Delivery> {
        let Some(call) = self.calls.remove(call_id) else {
            return Vec::new();
        };
        let other = call.other_participant(ending_user_id).to_string();

        self.connections
            .lookup_by_user(&other)
            .map(|peer| {
                vec![Delivery::new(
                    peer.connection_id.clone(),
                    ServerEvent::call_ended(call.call_id.clone(), ending_user_id),
                )]
            })
            .unwrap_or_default()
    }

    /// Resolve a room's members through the connection registry, silently
    /// dropping any connection id that no longer resolves.
    fn roster(&self, chat_id: &str) -> Vec<RoomMember> {
        self.rooms
            .member_ids(chat_id)
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|c| RoomMember {
                user_id: c.user_id.clone(),
                display_name: c.display_name.clone(),
            })
            .collect()
    }

    /// Send the current roster to every member of a room.
    fn broadcast_roster(&self, chat_id: &str) -> Vec<Delivery> {
        let users = self.roster(chat_id);
        self.rooms
            .member_ids(chat_id)
            .into_iter()
            .map(|target| {
                Delivery::new(
                    target,
                    ServerEvent::OnlineUsers {
                        chat_id: chat_id.to_string(),
                        users: users.clone(),
                    },
                )
            })
            .collect()
    }

    /// Fan an event out to every member of a room, optionally excluding
    /// one connection.
    fn broadcast(&self, chat_id: &str, event: &ServerEvent, except: Option<&str>) -> Vec<Delivery> {
        self.rooms
            .member_ids(chat_id)
            .into_iter()
            .filter(|id| except != Some(id.as_str()))
            .map(|target| Delivery::new(target, event.clone()))
            .collect()
    }
}

/// Stamp `serverTimestamp` onto a message object. Non-object payloads are
/// relayed untouched.
fn stamp_server_timestamp(message: &mut Value) {
    if let Value::Object(map) = message {
        map.insert("serverTimestamp".to_string(), json!(now_millis()));
    }
}
