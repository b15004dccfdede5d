//! Common types used throughout the room relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for rooms
pub type RoomId = Uuid;

/// Unique identifier for a live realtime connection
pub type ConnectionId = Uuid;

/// Client-supplied user identifier (not authenticated)
pub type UserId = String;

/// Free-form JSON object carried by chat and avatar events
pub type Payload = Map<String, Value>;

/// Positional seat of a participant inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// All sides in allocation order
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// Slot index of this side
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// A connection that has joined a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub room_id: RoomId,
    pub side: Side,
    pub joined_at: DateTime<Utc>,
    /// Identifies this particular join; a rejoin gets a new epoch
    pub session_epoch: u64,
}

impl Participant {
    /// Public view of the participant
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            connection_id: self.connection_id,
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            side: self.side,
        }
    }
}

/// Participant as seen by clients (`userInfo` on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    #[serde(rename = "socketId")]
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub side: Side,
}

/// Room listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub creator: String,
    pub current_users: usize,
    pub max_users: usize,
    pub invite_code: String,
    pub invite_link: String,
    pub created_at: DateTime<Utc>,
}

/// Full room record including its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub summary: RoomSummary,
    pub users: Vec<ParticipantInfo>,
}

/// Body of `POST /rooms`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub creator_name: Option<String>,
    #[serde(default)]
    pub max_users: Option<usize>,
}

/// Body of the `joinRoom` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Room id, or an invite code
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Body of the `tryOn` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnRequest {
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub jwt: Option<String>,
}

/// Product shown next to a generated avatar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
}

/// Result returned by the avatar service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarResult {
    pub avatar_url: String,
    pub product_info: ProductInfo,
}

/// Events sent by clients over the realtime connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom(JoinRoomRequest),
    Message(Payload),
    UpdateAvatar(Payload),
    TryOn(TryOnRequest),
    LeaveRoom,
}

/// Events sent to clients over the realtime connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected {
        socket_id: ConnectionId,
    },
    JoinRoomSuccess {
        room: RoomView,
        user_info: ParticipantInfo,
    },
    JoinRoomError {
        message: String,
    },
    UserJoined {
        message: String,
        user_info: ParticipantInfo,
        room: RoomView,
    },
    UserLeft {
        message: String,
        user_info: ParticipantInfo,
    },
    /// Chat message enriched with sender details
    Update(Payload),
    MessageError {
        message: String,
    },
    AvatarUpdated(Payload),
    AvatarError {
        message: String,
    },
    TryOnError {
        message: String,
    },
    RoomListUpdate {
        rooms: Vec<RoomSummary>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::JoinRoomSuccess { .. } => "joinRoomSuccess",
            ServerEvent::JoinRoomError { .. } => "joinRoomError",
            ServerEvent::UserJoined { .. } => "userJoined",
            ServerEvent::UserLeft { .. } => "userLeft",
            ServerEvent::Update(_) => "update",
            ServerEvent::MessageError { .. } => "messageError",
            ServerEvent::AvatarUpdated(_) => "avatarUpdated",
            ServerEvent::AvatarError { .. } => "avatarError",
            ServerEvent::TryOnError { .. } => "tryOnError",
            ServerEvent::RoomListUpdate { .. } => "roomListUpdate",
            ServerEvent::Error { .. } => "error",
        }
    }
}
