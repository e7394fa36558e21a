//! WebSocket transport for the room.
//!
//! Envelope types shared with the engine, and the socket handler that turns
//! frames into engine events.

pub mod chat;
pub mod messages;

pub use chat::{chat_ws_handler, WsQuery};
pub use messages::{ClientMessage, PresenceEntry, ServerMessage};
