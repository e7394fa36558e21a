//! Web interface for Parlor.
//!
//! A WebSocket endpoint carrying the room plus a health check.

pub mod router;
pub mod server;
pub mod ws;

pub use router::{create_health_router, create_router};
pub use server::WebServer;
