//! Chat lines as stored in history and sent to clients.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::COLOR_PREFIX_LEN;

/// Id carried by every system line.
pub const SYSTEM_MESSAGE_ID: i64 = -1;

/// Author shown on system lines.
pub const SYSTEM_AUTHOR: &str = "system";

/// Channel a line is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A user's chat message.
    Chat,
    /// Informational system line.
    Info,
    /// Error line for one connection.
    Error,
    /// Room-wide announcement.
    Announcement,
    /// Greeting on connect.
    Welcome,
}

impl MessageKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Info => "info",
            MessageKind::Error => "error",
            MessageKind::Announcement => "announcement",
            MessageKind::Welcome => "welcome",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat or system line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Monotonic id, or [`SYSTEM_MESSAGE_ID`].
    pub id: i64,
    /// Colored display nick of the author, or `system`.
    pub author: String,
    /// Message content.
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Delivery channel; carried by the envelope tag.
    #[serde(skip)]
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Create a user chat line.
    pub fn chat(id: i64, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self::at(id, author, content, MessageKind::Chat, Utc::now())
    }

    /// Create a system line.
    pub fn system(kind: MessageKind, content: impl Into<String>) -> Self {
        Self::at(SYSTEM_MESSAGE_ID, SYSTEM_AUTHOR, content, kind, Utc::now())
    }

    fn at(
        id: i64,
        author: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            content: content.into(),
            timestamp: at.timestamp_millis(),
            kind,
        }
    }

    /// Check whether this is a system line.
    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_MESSAGE_ID
    }

    /// Author name with the color prefix removed.
    pub fn author_name(&self) -> &str {
        if self.is_system() {
            return &self.author;
        }
        self.author.get(COLOR_PREFIX_LEN..).unwrap_or(&self.author)
    }
}
