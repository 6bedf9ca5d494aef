//! Codec for encoding and decoding Haven events.
//!
//! Events travel as JSON text frames, one event per WebSocket message.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum event size (16 MiB). File payloads are base64-inlined, so the
/// ceiling is deliberately generous.
pub const MAX_EVENT_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event).map_err(ProtocolError::Encode)?;
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a client event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a known event.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Decode a client event from raw bytes (binary WebSocket frames are
/// treated as UTF-8 JSON).
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a known event.
pub fn decode_slice(data: &[u8]) -> Result<ClientEvent, ProtocolError> {
    if data.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(data.len()));
    }
    serde_json::from_slice(data).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RoomMember;

    #[test]
    fn test_encode_server_event() {
        let event = ServerEvent::OnlineUsers {
            chat_id: "r1".into(),
            users: vec![RoomMember {
                user_id: "alice".into(),
                display_name: "Alice".into(),
            }],
        };

        let text = encode(&event).unwrap();
        assert!(text.contains("\"online-users\""));
        assert!(text.contains("\"chatId\":\"r1\""));
    }

    #[test]
    fn test_decode_client_event() {
        let event = decode(r#"{"event":"join-chat","data":{"chatId":"r1"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinChat {
                chat_id: "r1".into()
            }
        );

        let event = decode_slice(br#"{"event":"join-chat","data":{"chatId":"r2"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinChat {
                chat_id: "r2".into()
            }
        );
    }

    #[test]
    fn test_decode_unknown_event() {
        match decode(r#"{"event":"no-such-event","data":{}}"#) {
            Err(ProtocolError::Decode(_)) => {}
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_too_large() {
        let padding = "x".repeat(MAX_EVENT_SIZE + 1);
        match decode(&padding) {
            Err(ProtocolError::EventTooLarge(_)) => {}
            other => panic!("expected EventTooLarge error, got {other:?}"),
        }
    }
}
