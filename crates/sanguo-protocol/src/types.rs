//! Core wire types: identities and the message envelope.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A verified player identity, as supplied by the auth collaborator.
///
/// Newtype over `u64` so a `PlayerId` can never be passed where a
/// `RoomId` is expected. `#[serde(transparent)]` keeps it a bare number
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Identifies one room (one match and its membership).
///
/// Allocated by the room registry at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The `type` field of an [`Envelope`].
///
/// Client → server kinds carry a request in `data`; server → client kinds
/// carry a response or a broadcast notification. Serialized in
/// `snake_case`, so `GameAction` is `"game_action"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    // -- Connection --
    /// Client → Server: first frame, `data = {token}`.
    Auth,
    /// Server → Client: handshake accepted, `data = {player_id, name}`.
    AuthOk,
    /// Server → Client heartbeat.
    Ping,
    /// Client → Server heartbeat reply.
    Pong,

    // -- Rooms --
    CreateRoom,
    JoinRoom,
    LeaveRoom,
    ListRooms,
    RoomList,
    RoomJoined,
    SetReady,
    SelectGenerals,
    StartGame,

    // -- Matchmaking --
    JoinMatch,
    LeaveMatch,
    MatchStatus,
    MatchFound,

    // -- Gameplay --
    /// Client → Server: `data` is an action request.
    GameAction,
    /// Server → Client: reply to `game_action`, `data` is the response.
    ActionResponse,

    // -- Broadcasts --
    RoomUpdate,
    GameStart,
    GameEvents,
    GameOver,

    /// Server → Client: `data = {code, message}`.
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde name so logs match what clients see.
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) => f.write_str(&s),
            _ => write!(f, "{self:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One frame on the wire: `{type, room_id, player_id, data}`.
///
/// `data` stays a raw JSON value at this layer. The receiver picks the
/// payload type from `kind` and calls [`Envelope::data_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Envelope {
    /// An envelope with no room, player, or data.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            room_id: None,
            player_id: None,
            data: serde_json::Value::Null,
        }
    }

    /// Builds an envelope whose `data` is `payload` serialized to JSON.
    pub fn with_payload<T: Serialize>(
        kind: MessageKind,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(payload).map_err(ProtocolError::Encode)?;
        Ok(Self {
            data,
            ..Self::new(kind)
        })
    }

    /// Sets `room_id`.
    pub fn in_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    /// Sets `player_id`.
    pub fn for_player(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    /// An `error` envelope. `code` follows HTTP conventions.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        let body = ErrorBody {
            code,
            message: message.into(),
        };
        Self {
            data: serde_json::json!({ "code": body.code, "message": body.message }),
            ..Self::new(MessageKind::Error)
        }
    }

    /// Decodes `data` into the payload type for this envelope's kind.
    ///
    /// A missing `data` field decodes as JSON `null`, so payloads made
    /// entirely of optional fields still work.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.data).map_err(|source| ProtocolError::InvalidPayload {
            kind: self.kind.to_string(),
            source,
        })
    }

    /// Returns `room_id` or a protocol error naming the message kind.
    pub fn require_room(&self) -> Result<RoomId, ProtocolError> {
        self.room_id.ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("{} requires room_id", self.kind))
        })
    }
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}
