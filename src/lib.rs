//! Parlor - a single-room real-time chat server
//!
//! Durable nicknames, slash commands, moderation and bounded history for
//! one room, served over WebSocket.

pub mod chat;
pub mod command;
pub mod config;
pub mod emote;
pub mod engine;
pub mod error;
pub mod hub;
pub mod identity;
pub mod logging;
pub mod moderation;
pub mod security;
pub mod session;
pub mod snapshot;
pub mod web;

pub use chat::{ChatMessage, MessageKind, MessageLog};
pub use command::{CommandError, CommandKind, InputAction};
pub use config::Config;
pub use engine::{Engine, EngineEvent, EngineHandle, WeakEngineHandle};
pub use error::{ErrorCategory, ParlorError, Result};
pub use hub::{ConnId, Hub, Outbound};
pub use identity::{Identity, IdentityError, IdentityRegistry};
pub use moderation::{CleanText, ModerationEngine, ModerationError, TextKind};
pub use security::{BanGate, SecurityError};
pub use session::{SessionError, SessionState};
pub use web::WebServer;
