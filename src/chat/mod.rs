//! Chat lines and the bounded message history.

mod log;
mod message;

pub use log::MessageLog;
pub use message::{ChatMessage, MessageKind, SYSTEM_AUTHOR, SYSTEM_MESSAGE_ID};
