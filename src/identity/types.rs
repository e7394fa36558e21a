//! Identity records and the colored display nick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCategory;

/// Length of the `#RRGGBB` color prefix.
pub const COLOR_PREFIX_LEN: usize = 7;

/// Color given to every new identity.
pub const DEFAULT_COLOR: &str = "#000000";

/// Status given to every new identity.
pub const DEFAULT_STATUS: &str = "online";

/// Identity registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The requested nick equals the current one.
    #[error("that's already your name silly")]
    AlreadyNamed,

    /// The nick belongs to another identity.
    #[error("nickname is already in use")]
    NameTaken,

    /// No identity matches the id or name.
    #[error("couldn't find {0}")]
    NotFound(String),

    /// A color that is not `#RRGGBB`.
    #[error("invalid hex code {0}. please use format #RRGGBB")]
    InvalidColor(String),

    /// A stored nick without a color prefix.
    #[error("malformed display nick: {0}")]
    MalformedNick(String),
}

impl IdentityError {
    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            IdentityError::NameTaken => ErrorCategory::Policy,
            IdentityError::NotFound(_) => ErrorCategory::NotFound,
            IdentityError::AlreadyNamed
            | IdentityError::InvalidColor(_)
            | IdentityError::MalformedNick(_) => ErrorCategory::Validation,
        }
    }
}

/// Check for a `#RRGGBB` string.
pub fn is_hex_color(s: &str) -> bool {
    s.len() == COLOR_PREFIX_LEN
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// A display nick: a `#RRGGBB` color followed by the name.
///
/// The first seven characters are always a valid hex color; this holds for
/// values built here and for values read back from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayNick(String);

impl DisplayNick {
    /// Build a nick from a color and a name.
    pub fn new(color: &str, name: &str) -> Result<Self, IdentityError> {
        if !is_hex_color(color) {
            return Err(IdentityError::InvalidColor(color.to_string()));
        }
        Ok(Self(format!("{}{}", color.to_uppercase(), name)))
    }

    /// The `#RRGGBB` prefix.
    pub fn color(&self) -> &str {
        &self.0[..COLOR_PREFIX_LEN]
    }

    /// The name without its color.
    pub fn name(&self) -> &str {
        &self.0[COLOR_PREFIX_LEN..]
    }

    /// Same name, different color.
    pub fn with_color(&self, color: &str) -> Result<Self, IdentityError> {
        Self::new(color, self.name())
    }

    /// Same color, different name.
    pub fn with_name(&self, name: &str) -> Self {
        Self(format!("{}{}", self.color(), name))
    }

    /// The full colored string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayNick {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.get(..COLOR_PREFIX_LEN) {
            Some(prefix) if is_hex_color(prefix) => Ok(Self(value)),
            _ => Err(IdentityError::MalformedNick(value)),
        }
    }
}

impl From<DisplayNick> for String {
    fn from(nick: DisplayNick) -> Self {
        nick.0
    }
}

impl std::fmt::Display for DisplayNick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A durable user profile, independent of any connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable id (UUID).
    pub id: String,
    /// Colored display nick.
    pub nick: DisplayNick,
    /// Free-form status shown in the presence list.
    pub status: String,
    /// Moderator flag.
    pub is_mod: bool,
    /// Last accepted chat message. A future value means muted until then.
    pub last_message: DateTime<Utc>,
    /// Last profile edit (nick, color, status, afk).
    pub last_changed: DateTime<Utc>,
    /// Away flag.
    pub is_afk: bool,
}

impl Identity {
    /// Create a fresh identity with the default color and status.
    pub fn new(id: impl Into<String>, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            nick: DisplayNick(format!("{DEFAULT_COLOR}{name}")),
            status: DEFAULT_STATUS.to_string(),
            is_mod: false,
            last_message: DateTime::<Utc>::default(),
            last_changed: now,
            is_afk: false,
        }
    }

    /// The name without its color.
    pub fn name(&self) -> &str {
        self.nick.name()
    }

    /// Check whether the identity is muted at `now`.
    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.last_message > now
    }
}
