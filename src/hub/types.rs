//! Wire types for the chat hub.
//!
//! These types define the protocol between clients and the hub, shared by
//! the WebSocket and polling transports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection-scoped participant identifier.
pub type ParticipantId = Uuid;

/// An authenticated connection's identity within the hub.
///
/// Created once per connection after credential verification; the identity
/// is immutable for the connection's lifetime.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub user_id: String,
    pub handle: String,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            handle: handle.into(),
        }
    }
}

/// Message classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    System,
}

/// Reserved non-user sender identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservedSender {
    Assistant,
    System,
}

/// A user reference as observed by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub handle: String,
}

/// Message sender: a user reference, or the reserved `"assistant"` /
/// `"system"` identities serialized as bare strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sender {
    User(UserRef),
    Reserved(ReservedSender),
}

impl Sender {
    pub fn user(id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self::User(UserRef {
            id: id.into(),
            handle: handle.into(),
        })
    }

    pub fn assistant() -> Self {
        Self::Reserved(ReservedSender::Assistant)
    }

    pub fn system() -> Self {
        Self::Reserved(ReservedSender::System)
    }
}

/// A chat message as delivered to clients.
///
/// Ids are monotonic per room; messages are immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub room: String,
    pub kind: MessageKind,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_error: bool,
}

/// Entry in a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub id: String,
    pub handle: String,
}

/// Events sent from the hub to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection established and authenticated.
    Connected,

    /// Heartbeat/keepalive ping.
    Ping,

    /// A chat message (`user`, `assistant`, or `system` kind).
    Message { message: ChatMessage },

    /// Full membership snapshot of a room.
    Presence {
        room: String,
        users: Vec<PresenceUser>,
    },

    /// Error reported to the originating connection only.
    Error { message: String },
}

/// Commands sent from clients to the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join a room, leaving any previous one.
    Join { room: String },

    /// Send a message to a room.
    Send { room: String, text: String },

    /// Keepalive response.
    Pong,
}

/// Broadcast envelope: an event plus an optional participant the transport
/// should not deliver it to (e.g. a join notice and its own joiner).
#[derive(Debug, Clone)]
pub struct Outbound {
    pub skip: Option<ParticipantId>,
    pub event: ServerEvent,
}
