//! Wire formats.
//!
//! Two layers travel over a connection:
//!
//! ```text
//! ┌──────────────────────────── RelayFrame (bincode) ───────────────────────────┐
//! │ Join │ Welcome │ Rejected │ PeerJoined │ PeerLeft │ Data │ Ended │ Ping/Pong │
//! └───────────────────────────────────────────────┬─────────────────────────────┘
//!                                                 │ payload
//!                                                 ▼
//!                              annotation Operation (tagged JSON)
//! ```
//!
//! The relay never looks inside `Data`; the JSON operation is the only
//! protocol peers agree on. No sequence number, ack or checksum is added.

use notary_core::{Operation, OperationError, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] OperationError),
}

// ---------------------------------------------------------------
// Annotation payload (JSON)
// ---------------------------------------------------------------

/// Serialize an operation to its JSON wire form.
pub fn encode_operation(op: &Operation) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(op).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

/// Parse and validate an operation received from a peer.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation, ProtocolError> {
    let op: Operation = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    op.validate()?;
    Ok(op)
}

// ---------------------------------------------------------------
// Relay envelope (bincode)
// ---------------------------------------------------------------

/// Peer identity as seen by the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub identity: String,
    pub role: Role,
}

impl PeerInfo {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }
}

/// Why a join was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum JoinRejection {
    #[error("invalid access token: {0}")]
    InvalidToken(String),
    #[error("identity '{0}' is already in the room")]
    DuplicateIdentity(String),
    #[error("room '{0}' is full")]
    RoomFull(String),
    #[error("malformed join request")]
    Malformed,
}

/// Envelope exchanged with the relay and fanned out inside rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayFrame {
    /// First frame from a client.
    Join {
        token: String,
        room: String,
        identity: String,
        role: Role,
    },
    /// Join accepted; lists peers already present.
    Welcome { peers: Vec<PeerInfo> },
    Rejected(JoinRejection),
    PeerJoined(PeerInfo),
    PeerLeft { identity: String },
    /// Opaque peer-to-peer payload.
    Data { from: String, payload: Vec<u8> },
    /// The room was shut down; members are disconnected.
    Ended { reason: String },
    Ping,
    Pong,
}

impl RelayFrame {
    /// Identity that caused this frame, for filtering a peer's own echoes.
    pub fn origin(&self) -> Option<&str> {
        match self {
            RelayFrame::Join { identity, .. } => Some(identity),
            RelayFrame::PeerJoined(info) => Some(&info.identity),
            RelayFrame::PeerLeft { identity } => Some(identity),
            RelayFrame::Data { from, .. } => Some(from),
            _ => None,
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::{Color, Point};

    #[test]
    fn test_operation_roundtrip_all_kinds() {
        let ops = [
            Operation::draw(
                1,
                [Point::new(10.0, 10.0), Point::new(20.0, 20.0)],
                Color::RED,
                3.0,
            ),
            Operation::text(1, 5.0, 5.0, "OK", 12.0, Color::BLACK),
            Operation::clear(1),
        ];
        for op in ops {
            let bytes = encode_operation(&op).unwrap();
            assert_eq!(decode_operation(&bytes).unwrap(), op);
        }
    }

    #[test]
    fn test_decode_accepts_peer_json() {
        let raw = br##"{"type":"draw","page":2,"path":[[1,2],[3,4.5]],"color":"#00FF00","strokeWidth":2}"##;
        let op = decode_operation(raw).unwrap();
        assert_eq!(op.page(), 2);
        match op {
            Operation::Draw(d) => {
                assert_eq!(d.path, vec![Point::new(1.0, 2.0), Point::new(3.0, 4.5)]);
                assert_eq!(d.color, Color::rgb(0, 255, 0));
            }
            other => panic!("expected draw, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases: [&[u8]; 6] = [
            br#"{"type":"unknown"}"#,
            b"not json at all",
            br#"{"type":"clear"}"#,
            br#"{"type":"clear","page":0}"#,
            br#"{"type":"text","page":1,"x":0,"y":0,"value":"a","fontSize":12,"color":"blue"}"#,
            &[0xff, 0xfe, 0x00],
        ];
        for raw in cases {
            assert!(decode_operation(raw).is_err(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_decode_invalid_stroke_width_is_invalid_operation() {
        let raw = br##"{"type":"draw","page":1,"path":[[0,0],[1,1]],"color":"#000000","strokeWidth":0}"##;
        assert!(matches!(
            decode_operation(raw),
            Err(ProtocolError::InvalidOperation(OperationError::InvalidStrokeWidth(_)))
        ));
    }

    #[test]
    fn test_relay_frame_roundtrip() {
        let frames = [
            RelayFrame::Join {
                token: "key.1.abc".into(),
                room: "notary-room".into(),
                identity: "notary".into(),
                role: Role::Notary,
            },
            RelayFrame::Welcome {
                peers: vec![PeerInfo::new("client", Role::Client)],
            },
            RelayFrame::Rejected(JoinRejection::RoomFull("r".into())),
            RelayFrame::Data {
                from: "notary".into(),
                payload: br#"{"type":"clear","page":1}"#.to_vec(),
            },
            RelayFrame::Ended {
                reason: "closed by host".into(),
            },
            RelayFrame::Ping,
        ];
        for frame in frames {
            let bytes = frame.encode().unwrap();
            assert_eq!(RelayFrame::decode(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn test_relay_frame_origin() {
        let data = RelayFrame::Data {
            from: "a".into(),
            payload: vec![],
        };
        assert_eq!(data.origin(), Some("a"));
        assert_eq!(RelayFrame::Ping.origin(), None);
        assert_eq!(
            RelayFrame::PeerJoined(PeerInfo::new("b", Role::Client)).origin(),
            Some("b")
        );
    }

    #[test]
    fn test_decode_garbage_frame() {
        assert!(RelayFrame::decode(&[0xFF, 0xFE, 0xFD]).is_err());
    }
}
