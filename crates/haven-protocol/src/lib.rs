//! # haven-protocol
//!
//! Wire event definitions for the Haven realtime signaling engine.
//!
//! This crate defines the JSON events exchanged between Haven clients and
//! servers. Field and event names are part of the client contract and must
//! not change.
//!
//! ## Events
//!
//! - `join-user` / `user-connected` - Identity declaration
//! - `join-chat` / `leave-chat` / `online-users` - Room membership
//! - `send-message` / `send-file` / `receive-message` - Chat messages
//! - `typing` / `message-status` - Message metadata relays
//! - `initiate-call` / `call-response` / `end-call` and their
//!   `incoming-call` / `call-*` counterparts - Call signaling
//!
//! ## Example
//!
//! ```rust
//! use haven_protocol::{codec, ClientEvent};
//!
//! let event = codec::decode(r#"{"event":"join-chat","data":{"chatId":"r1"}}"#).unwrap();
//! assert!(matches!(event, ClientEvent::JoinChat { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, ProtocolError};
pub use events::{CallAnswer, CallId, ChatId, ClientEvent, RoomMember, ServerEvent};
