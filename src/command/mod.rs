//! Slash commands.
//!
//! A line starting with `/` is parsed into an [`Invocation`], resolved to a
//! [`CommandKind`] and run by its handler against the engine.

mod error;
mod handlers;
mod parse;

pub use error::{CommandError, InputAction};
pub use handlers::dispatch;
pub use parse::{command_help, format_help, parse_input, ChatInput, CommandInfo, CommandKind, Invocation};
