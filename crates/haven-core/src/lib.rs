//! # haven-core
//!
//! Registries, call state machine, and signaling dispatcher for the Haven
//! realtime engine.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **ConnectionRegistry** - Live connections and their declared identities
//! - **RoomIndex** - Which connections are viewing which chat thread
//! - **CallRegistry** - Voice/video call negotiation state
//! - **SignalingState** - Dispatcher turning inbound events into deliveries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ ClientEvent │────▶│ SignalingState │────▶│ Deliveries  │
//! └─────────────┘     └────────────────┘     └─────────────┘
//!                       │       │      │
//!                       ▼       ▼      ▼
//!                 Connections  Rooms  Calls
//! ```
//!
//! Everything here is transport-free and synchronous; the server crate owns
//! the lock, the sockets, and the reaper timer.

pub mod call;
pub mod connection;
pub mod dispatcher;
pub mod room;

pub use call::{now_millis, unique_id, Call, CallRegistry, CallStatus};
pub use connection::{Connection, ConnectionId, ConnectionRegistry};
pub use dispatcher::{Delivery, SignalingState, SignalingStats};
pub use room::RoomIndex;
