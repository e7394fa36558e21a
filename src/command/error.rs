//! Command errors and the input action returned to clients.

use thiserror::Error;

use crate::error::ErrorCategory;
use crate::identity::IdentityError;
use crate::moderation::ModerationError;
use crate::security::SecurityError;
use crate::session::SessionError;

/// What the client should do with its input box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Clear the input.
    Clear,
    /// Keep the input so the user can fix it.
    Keep,
}

impl InputAction {
    /// Check if the input should be cleared.
    pub fn clears(&self) -> bool {
        matches!(self, InputAction::Clear)
    }
}

/// Errors a command handler reports to its caller.
///
/// The display string is the line shown to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command name.
    #[error("that's not a command lol")]
    NotFound,

    /// A non-moderator ran a moderator command.
    #[error("naughty naughty")]
    Unauthorized,

    /// The action needs a nickname first.
    #[error("please use /nick <nickname> before trying to {0}")]
    NeedsIdentity(&'static str),

    /// Bad or missing arguments.
    #[error("{0}")]
    Usage(String),

    /// An argument in the wrong format.
    #[error("not a valid {0}")]
    InvalidFormat(&'static str),

    /// No retained message has that id.
    #[error("couldn't find message {0}")]
    MessageNotFound(i64),

    /// Data request from a connection with no identity.
    #[error("no server stored data")]
    NoData,

    /// `/colour`.
    #[error("lern to speak american")]
    Colour,

    #[error(transparent)]
    Moderation(#[from] ModerationError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl CommandError {
    /// Error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CommandError::NotFound | CommandError::MessageNotFound(_) | CommandError::NoData => {
                ErrorCategory::NotFound
            }
            CommandError::Unauthorized => ErrorCategory::Authorization,
            CommandError::NeedsIdentity(_)
            | CommandError::Usage(_)
            | CommandError::InvalidFormat(_)
            | CommandError::Colour => ErrorCategory::Validation,
            CommandError::Moderation(e) => e.category(),
            CommandError::Identity(e) => e.category(),
            CommandError::Session(e) => e.category(),
            CommandError::Security(e) => e.category(),
        }
    }

    /// Input action to send along with the error line.
    ///
    /// Refusals the user cannot fix by editing the line clear the input.
    pub fn input_action(&self) -> InputAction {
        match self {
            CommandError::Unauthorized | CommandError::NeedsIdentity(_) | CommandError::NoData => {
                InputAction::Clear
            }
            _ => InputAction::Keep,
        }
    }
}
