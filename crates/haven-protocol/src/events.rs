//! Event types for the Haven signaling protocol.
//!
//! Every WebSocket text frame carries exactly one event, enveloped as
//! `{"event": "<name>", "data": {...}}`. Event names and payload field
//! names are fixed; existing clients depend on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chat room identifier, supplied by the client.
pub type ChatId = String;

/// A server-generated call identifier.
pub type CallId = String;

/// A member of a room, as reported in `online-users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    /// User identifier (client-declared).
    pub user_id: String,
    /// Display name (client-declared).
    pub display_name: String,
}

/// A client's answer to an incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAnswer {
    /// Callee picked up; the call becomes active.
    Accept,
    /// Callee declined; the call is removed.
    Reject,
}

/// Events received from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Declare the identity behind this connection.
    #[serde(rename = "join-user", rename_all = "camelCase")]
    JoinUser {
        user_id: String,
        display_name: String,
    },

    /// Join a chat room.
    #[serde(rename = "join-chat", rename_all = "camelCase")]
    JoinChat { chat_id: ChatId },

    /// Leave a chat room.
    #[serde(rename = "leave-chat", rename_all = "camelCase")]
    LeaveChat { chat_id: ChatId },

    /// Send a chat message to a room. The message body is an opaque JSON
    /// object; the server stamps `serverTimestamp` before broadcasting.
    #[serde(rename = "send-message", rename_all = "camelCase")]
    SendMessage { chat_id: ChatId, message: Value },

    /// Typing indicator, relayed to everyone else in the room.
    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        chat_id: ChatId,
        from: String,
        is_typing: bool,
    },

    /// Message delivery/read status update, relayed to the whole room.
    #[serde(rename = "message-status", rename_all = "camelCase")]
    MessageStatus {
        chat_id: ChatId,
        message_id: String,
        status: String,
    },

    /// Request the current member list of a room.
    #[serde(rename = "get-online-users", rename_all = "camelCase")]
    GetOnlineUsers { chat_id: ChatId },

    /// Start a voice/video call with another user.
    #[serde(rename = "initiate-call", rename_all = "camelCase")]
    InitiateCall {
        chat_id: ChatId,
        caller_id: String,
        callee_id: String,
        /// Media type tag, e.g. `"audio"` or `"video"`.
        #[serde(rename = "type")]
        media_type: String,
    },

    /// Accept or reject an incoming call.
    #[serde(rename = "call-response", rename_all = "camelCase")]
    CallResponse {
        call_id: CallId,
        response: CallAnswer,
        user_id: String,
    },

    /// Hang up an active or pending call.
    #[serde(rename = "end-call", rename_all = "camelCase")]
    EndCall { call_id: CallId, user_id: String },

    /// Send a file message to a room.
    #[serde(rename = "send-file", rename_all = "camelCase")]
    SendFile {
        chat_id: ChatId,
        from: String,
        file_name: String,
        file_type: String,
        file_size: u64,
        file_data: String,
        /// Client-side send timestamp. Left opaque: clients send epoch
        /// milliseconds or ISO-8601 strings, and the value is relayed
        /// as-is either way.
        timestamp: Value,
    },
}

/// Events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges `join-user`, echoing the declared identity.
    #[serde(rename = "user-connected", rename_all = "camelCase")]
    UserConnected {
        user_id: String,
        display_name: String,
    },

    /// Current member list of a room.
    #[serde(rename = "online-users", rename_all = "camelCase")]
    OnlineUsers {
        chat_id: ChatId,
        users: Vec<RoomMember>,
    },

    /// A chat or file message, stamped with `serverTimestamp`.
    #[serde(rename = "receive-message", rename_all = "camelCase")]
    ReceiveMessage { chat_id: ChatId, message: Value },

    /// Relayed typing indicator.
    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        chat_id: ChatId,
        from: String,
        is_typing: bool,
    },

    /// Relayed message status update.
    #[serde(rename = "message-status", rename_all = "camelCase")]
    MessageStatus {
        chat_id: ChatId,
        message_id: String,
        status: String,
    },

    /// A call is being offered to this connection.
    #[serde(rename = "incoming-call", rename_all = "camelCase")]
    IncomingCall {
        call_id: CallId,
        chat_id: ChatId,
        caller_id: String,
        caller_name: String,
        #[serde(rename = "type")]
        media_type: String,
    },

    /// Call setup failed; sent only to the caller.
    #[serde(rename = "call-failed", rename_all = "camelCase")]
    CallFailed { reason: String },

    /// The callee accepted; sent to the caller.
    #[serde(rename = "call-accepted", rename_all = "camelCase")]
    CallAccepted { call_id: CallId, callee_id: String },

    /// The callee declined; sent to the caller.
    #[serde(rename = "call-rejected", rename_all = "camelCase")]
    CallRejected { call_id: CallId, reason: String },

    /// The call is over; sent to the other participant.
    #[serde(rename = "call-ended", rename_all = "camelCase")]
    CallEnded {
        call_id: CallId,
        ended_by: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ServerEvent {
    /// Create a `call-failed` event.
    #[must_use]
    pub fn call_failed(reason: impl Into<String>) -> Self {
        ServerEvent::CallFailed {
            reason: reason.into(),
        }
    }

    /// Create a `call-ended` event without a reason.
    #[must_use]
    pub fn call_ended(call_id: impl Into<CallId>, ended_by: impl Into<String>) -> Self {
        ServerEvent::CallEnded {
            call_id: call_id.into(),
            ended_by: ended_by.into(),
            reason: None,
        }
    }

    /// Create a `call-ended` event with a reason.
    #[must_use]
    pub fn call_ended_with_reason(
        call_id: impl Into<CallId>,
        ended_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ServerEvent::CallEnded {
            call_id: call_id.into(),
            ended_by: ended_by.into(),
            reason: Some(reason.into()),
        }
    }
}
