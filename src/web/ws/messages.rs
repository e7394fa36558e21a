//! WebSocket message types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, MessageKind};
use crate::identity::Identity;

/// Messages sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A chat line or a slash command.
    Message {
        /// Raw line.
        content: String,
    },
    /// Heartbeat ping.
    Ping,
}

/// One row of the presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PresenceEntry {
    /// A bound identity.
    User {
        /// Colored display nick.
        #[serde(rename = "displayName")]
        display_name: String,
        /// Status line.
        status: String,
        /// Away flag.
        #[serde(rename = "isAfk")]
        is_afk: bool,
    },
    /// Connections without an identity.
    Lurkers {
        /// Count of unbound connections.
        lurkers: usize,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// User chat line.
    Chat(ChatMessage),
    /// Informational system line.
    Info(ChatMessage),
    /// Error line.
    Error(ChatMessage),
    /// Announcement line.
    Announcement(ChatMessage),
    /// Greeting on connect.
    Welcome(ChatMessage),
    /// The identity bound to this connection.
    Identity {
        /// Full identity record.
        identity: Identity,
    },
    /// Discard the locally stored identity.
    ResetIdentity,
    /// Presence list.
    Presence {
        /// One row per identity, then the lurker row.
        users: Vec<PresenceEntry>,
    },
    /// Messages removed from history.
    DeleteMessages {
        /// Removed ids.
        ids: Vec<i64>,
    },
    /// Emote name to image URL.
    Emotes {
        /// The full emote map.
        emotes: BTreeMap<String, String>,
    },
    /// Whether the client should clear its input box.
    Ack {
        /// Clear flag.
        clear: bool,
    },
    /// Heartbeat pong response.
    Pong,
}

impl ServerMessage {
    /// Wrap a line in the envelope matching its kind.
    pub fn line(msg: ChatMessage) -> Self {
        match msg.kind {
            MessageKind::Chat => Self::Chat(msg),
            MessageKind::Info => Self::Info(msg),
            MessageKind::Error => Self::Error(msg),
            MessageKind::Announcement => Self::Announcement(msg),
            MessageKind::Welcome => Self::Welcome(msg),
        }
    }

    /// Create a system error line.
    pub fn error(content: impl Into<String>) -> Self {
        Self::line(ChatMessage::system(MessageKind::Error, content))
    }

    /// Create a system info line.
    pub fn info(content: impl Into<String>) -> Self {
        Self::line(ChatMessage::system(MessageKind::Info, content))
    }

    /// Envelope type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Chat(_) => "chat",
            ServerMessage::Info(_) => "info",
            ServerMessage::Error(_) => "error",
            ServerMessage::Announcement(_) => "announcement",
            ServerMessage::Welcome(_) => "welcome",
            ServerMessage::Identity { .. } => "identity",
            ServerMessage::ResetIdentity => "reset_identity",
            ServerMessage::Presence { .. } => "presence",
            ServerMessage::DeleteMessages { .. } => "delete_messages",
            ServerMessage::Emotes { .. } => "emotes",
            ServerMessage::Ack { .. } => "ack",
            ServerMessage::Pong => "pong",
        }
    }

    /// The carried line, for line envelopes.
    pub fn as_line(&self) -> Option<&ChatMessage> {
        match self {
            ServerMessage::Chat(msg)
            | ServerMessage::Info(msg)
            | ServerMessage::Error(msg)
            | ServerMessage::Announcement(msg)
            | ServerMessage::Welcome(msg) => Some(msg),
            _ => None,
        }
    }
}
