//! Binary protocol for room traffic.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬──────────┬───────────┬──────────┬──────────┐
//! │ msg_type │ room_id  │ origin    │ clock    │ payload  │
//! │ 1 byte   │ ≤64 B    │ 16 bytes  │ varint   │ variable │
//! └──────────┴──────────┴───────────┴──────────┴──────────┘
//! ```
//!
//! `clock` is the sender's Lamport clock; only code updates carry a
//! non-zero value.

use std::fmt;

use playground_core::LanguageId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted room id.
pub const MAX_ROOM_ID_LEN: usize = 64;

const ROOM_ID_LEN: usize = 8;
const ROOM_ID_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// URL-safe room token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validate user input. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_ROOM_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ProtocolError::InvalidRoomId(raw.to_string()))
        }
    }

    /// Fresh 8-character base-36 token drawn from UUID v4 randomness.
    pub fn generate() -> Self {
        let mut bits = Uuid::new_v4().as_u128();
        let mut id = String::with_capacity(ROOM_ID_LEN);
        for _ in 0..ROOM_ID_LEN {
            id.push(ROOM_ID_ALPHABET[(bits % 36) as usize] as char);
            bits /= 36;
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Participant identity with display metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Create with explicit id (for testing)
    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Message types for the room protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Editor text/language change
    CodeUpdate = 1,
    /// Participant joined the room
    PeerJoined = 2,
    /// Participant left the room
    PeerLeft = 3,
}

/// Body of a code update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePayload {
    pub source: String,
    pub language: LanguageId,
}

/// Remote edit delivered to local listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUpdateEvent {
    pub room_id: RoomId,
    pub source: String,
    pub language_id: LanguageId,
    pub origin_participant: Uuid,
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub msg_type: MessageType,
    pub room_id: RoomId,
    pub origin: Uuid,
    /// Lamport clock for last-writer-wins ordering
    pub clock: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode_body<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

impl WireMessage {
    /// Create a code update message.
    pub fn code_update(
        origin: Uuid,
        room_id: RoomId,
        clock: u64,
        payload: &CodePayload,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::CodeUpdate,
            room_id,
            origin,
            clock,
            payload: encode_body(payload)?,
        })
    }

    /// Create a peer joined notification.
    pub fn peer_joined(room_id: RoomId, info: &Participant) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::PeerJoined,
            room_id,
            origin: info.id,
            clock: 0,
            payload: encode_body(info)?,
        })
    }

    /// Create a peer left notification.
    pub fn peer_left(room_id: RoomId, origin: Uuid) -> Self {
        Self {
            msg_type: MessageType::PeerLeft,
            room_id,
            origin,
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_body(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_body(bytes)
    }

    /// Parse code update payload.
    pub fn code_payload(&self) -> Result<CodePayload, ProtocolError> {
        if self.msg_type != MessageType::CodeUpdate {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_body(&self.payload)
    }

    /// Parse participant payload.
    pub fn participant(&self) -> Result<Participant, ProtocolError> {
        if self.msg_type != MessageType::PeerJoined {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_body(&self.payload)
    }

    /// Build the listener-facing event for a code update.
    pub fn to_event(&self) -> Result<CodeUpdateEvent, ProtocolError> {
        let payload = self.code_payload()?;
        Ok(CodeUpdateEvent {
            room_id: self.room_id.clone(),
            source: payload.source,
            language_id: payload.language,
            origin_participant: self.origin,
        })
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    InvalidRoomId(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::InvalidRoomId(raw) => write!(f, "Invalid room id: {raw:?}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
