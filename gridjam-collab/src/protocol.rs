//! Binary protocol for room-scoped grid synchronization.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬────────────┬──────────┐
//! │ msg_type │ conn_id   │ room       │ payload  │
//! │ 1 byte   │ 16 bytes  │ variable   │ variable │
//! └──────────┴───────────┴────────────┴──────────┘
//! ```
//!
//! Typed payloads are bincode-encoded inside `payload` (except the
//! import document, which travels as the JSON bytes of an
//! [`ExportDocument`] so that legacy cell forms are normalized server
//! side). Per-room edit broadcasts come in ordered pairs: a `NoteUpdate`
//! for the live grid followed by a `HistoryAppend` carrying the same
//! action as an append-only delta — clients extend their local log
//! rather than receiving it whole on every edit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gridjam_core::{Action, ActionLog, CellValue, Grid};

/// Message types for the room protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Bind the connection to a room (leaving any previous room)
    JoinRoom = 1,
    /// Toggle an instrument at a grid position
    ToggleNote = 2,
    /// Replace the room's grid + log with an exported document
    ImportState = 3,
    /// Ask for the current room list
    RequestRoomList = 4,
    /// Existence/user-count query for one room
    CheckRoom = 5,
    /// Full room state (grid + log) for a joiner or after an import
    InitialState = 6,
    /// Single-cell update for the live grid
    NoteUpdate = 7,
    /// Append-only history delta (one action)
    HistoryAppend = 8,
    /// Member count of the room
    UserCount = 9,
    /// Summary of every room, in creation order
    RoomList = 10,
    /// Reply to a CheckRoom query
    RoomInfo = 11,
    /// Heartbeat ping
    Ping = 12,
    /// Heartbeat pong
    Pong = 13,
}

/// Toggle request payload. `instrument` defaults server-side when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TogglePayload {
    pub row: usize,
    pub col: usize,
    pub instrument: Option<String>,
}

/// Full room state sent to a joiner (and rebroadcast after an import).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialStatePayload {
    pub grid: Grid,
    pub history: ActionLog,
}

/// Single-cell update: the value the cell holds after the edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteUpdatePayload {
    pub row: usize,
    pub col: usize,
    pub active: CellValue,
}

/// One room in the room list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub name: String,
    pub users: usize,
}

/// Reply to a room existence query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfoPayload {
    pub exists: bool,
    pub user_count: usize,
}

/// Top-level protocol message.
///
/// Server-originated messages carry `Uuid::nil()` as `conn_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMessage {
    pub msg_type: MessageType,
    pub conn_id: Uuid,
    /// Room the message concerns; empty for lobby-wide messages.
    pub room: String,
    /// Message payload (varies by msg_type).
    pub payload: Vec<u8>,
}

/// Encode a typed payload for embedding in a [`RoomMessage`].
///
/// Every payload type passed here is a plain derive struct (no maps with
/// non-string keys, no untagged enums, no custom `Serialize` impls), and
/// bincode's standard config encodes those without error. The fallback
/// exists only to keep the constructors infallible; it logs before
/// substituting an empty payload so a future payload type that does fail
/// shows up in the server log instead of as a silent decode error on the
/// peer.
fn encode_payload<T: Serialize>(value: &T) -> Vec<u8> {
    match bincode::serde::encode_to_vec(value, bincode::config::standard()) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Payload encoding failed: {e}");
            Vec::new()
        }
    }
}

fn decode_payload<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

impl RoomMessage {
    /// Client: join (or switch to) a room.
    pub fn join_room(conn_id: Uuid, room: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::JoinRoom,
            conn_id,
            room: room.into(),
            payload: Vec::new(),
        }
    }

    /// Client: toggle an instrument at (row, col).
    pub fn toggle_note(
        conn_id: Uuid,
        room: impl Into<String>,
        row: usize,
        col: usize,
        instrument: Option<String>,
    ) -> Self {
        Self {
            msg_type: MessageType::ToggleNote,
            conn_id,
            room: room.into(),
            payload: encode_payload(&TogglePayload { row, col, instrument }),
        }
    }

    /// Client: replace room state with an exported JSON document.
    pub fn import_state(conn_id: Uuid, room: impl Into<String>, document_json: String) -> Self {
        Self {
            msg_type: MessageType::ImportState,
            conn_id,
            room: room.into(),
            payload: document_json.into_bytes(),
        }
    }

    /// Client: request the room list.
    pub fn request_room_list(conn_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::RequestRoomList,
            conn_id,
            room: String::new(),
            payload: Vec::new(),
        }
    }

    /// Client: existence query for a room.
    pub fn check_room(conn_id: Uuid, room: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::CheckRoom,
            conn_id,
            room: room.into(),
            payload: Vec::new(),
        }
    }

    /// Server: full room state for a joiner.
    pub fn initial_state(room: impl Into<String>, grid: &Grid, history: &ActionLog) -> Self {
        Self {
            msg_type: MessageType::InitialState,
            conn_id: Uuid::nil(),
            room: room.into(),
            payload: encode_payload(&InitialStatePayload {
                grid: grid.clone(),
                history: history.clone(),
            }),
        }
    }

    /// Server: single-cell live update.
    pub fn note_update(room: impl Into<String>, row: usize, col: usize, active: CellValue) -> Self {
        Self {
            msg_type: MessageType::NoteUpdate,
            conn_id: Uuid::nil(),
            room: room.into(),
            payload: encode_payload(&NoteUpdatePayload { row, col, active }),
        }
    }

    /// Server: append-only history delta.
    pub fn history_append(room: impl Into<String>, action: &Action) -> Self {
        Self {
            msg_type: MessageType::HistoryAppend,
            conn_id: Uuid::nil(),
            room: room.into(),
            payload: encode_payload(action),
        }
    }

    /// Server: member count of a room.
    pub fn user_count(room: impl Into<String>, count: usize) -> Self {
        Self {
            msg_type: MessageType::UserCount,
            conn_id: Uuid::nil(),
            room: room.into(),
            payload: encode_payload(&count),
        }
    }

    /// Server: room list, in creation order.
    pub fn room_list(rooms: &[RoomSummary]) -> Self {
        Self {
            msg_type: MessageType::RoomList,
            conn_id: Uuid::nil(),
            room: String::new(),
            payload: encode_payload(&rooms.to_vec()),
        }
    }

    /// Server: reply to a CheckRoom query.
    pub fn room_info(room: impl Into<String>, exists: bool, user_count: usize) -> Self {
        Self {
            msg_type: MessageType::RoomInfo,
            conn_id: Uuid::nil(),
            room: room.into(),
            payload: encode_payload(&RoomInfoPayload { exists, user_count }),
        }
    }

    /// Heartbeat ping.
    pub fn ping(conn_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Ping,
            conn_id,
            room: String::new(),
            payload: Vec::new(),
        }
    }

    /// Heartbeat pong.
    pub fn pong(conn_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Pong,
            conn_id,
            room: String::new(),
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    fn expect_type(&self, expected: MessageType) -> Result<(), ProtocolError> {
        if self.msg_type != expected {
            return Err(ProtocolError::InvalidMessageType);
        }
        Ok(())
    }

    /// Parse a ToggleNote payload.
    pub fn toggle_payload(&self) -> Result<TogglePayload, ProtocolError> {
        self.expect_type(MessageType::ToggleNote)?;
        decode_payload(&self.payload)
    }

    /// Parse an InitialState payload.
    pub fn initial_state_payload(&self) -> Result<InitialStatePayload, ProtocolError> {
        self.expect_type(MessageType::InitialState)?;
        decode_payload(&self.payload)
    }

    /// Parse a NoteUpdate payload.
    pub fn note_update_payload(&self) -> Result<NoteUpdatePayload, ProtocolError> {
        self.expect_type(MessageType::NoteUpdate)?;
        decode_payload(&self.payload)
    }

    /// Parse a HistoryAppend payload.
    pub fn history_action(&self) -> Result<Action, ProtocolError> {
        self.expect_type(MessageType::HistoryAppend)?;
        decode_payload(&self.payload)
    }

    /// Parse a UserCount payload.
    pub fn user_count_value(&self) -> Result<usize, ProtocolError> {
        self.expect_type(MessageType::UserCount)?;
        decode_payload(&self.payload)
    }

    /// Parse a RoomList payload.
    pub fn room_list_payload(&self) -> Result<Vec<RoomSummary>, ProtocolError> {
        self.expect_type(MessageType::RoomList)?;
        decode_payload(&self.payload)
    }

    /// Parse a RoomInfo payload.
    pub fn room_info_payload(&self) -> Result<RoomInfoPayload, ProtocolError> {
        self.expect_type(MessageType::RoomInfo)?;
        decode_payload(&self.payload)
    }

    /// The import document JSON carried by an ImportState message.
    pub fn import_json(&self) -> Result<&str, ProtocolError> {
        self.expect_type(MessageType::ImportState)?;
        std::str::from_utf8(&self.payload)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
    NotInRoom,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::NotInRoom => write!(f, "Connection is not bound to a room"),
        }
    }
}

impl std::error::Error for ProtocolError {}
