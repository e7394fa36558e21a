//! Live connections and their outbound queues.
//!
//! The hub is the engine's view of the transport: every connection has an
//! unbounded queue drained by its socket task. Sending never blocks; a
//! queue whose receiver is gone is skipped.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::web::ws::ServerMessage;

/// Connection id, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An item queued for a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialize and send.
    Message(ServerMessage),
    /// Close the socket.
    Close,
}

/// Sender half of a connection queue.
pub type Outbox = mpsc::UnboundedSender<Outbound>;

#[derive(Debug)]
struct Connection {
    addr: String,
    token: Option<String>,
    outbox: Outbox,
}

/// Delivery target for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// One connection.
    Conn(ConnId),
    /// Every connection.
    All,
}

/// Registered connections.
#[derive(Debug, Default)]
pub struct Hub {
    conns: BTreeMap<ConnId, Connection>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub fn register(
        &mut self,
        conn: ConnId,
        addr: impl Into<String>,
        token: Option<String>,
        outbox: Outbox,
    ) {
        self.conns.insert(
            conn,
            Connection {
                addr: addr.into(),
                token,
                outbox,
            },
        );
    }

    /// Forget a connection. Returns false if it was not registered.
    pub fn remove(&mut self, conn: ConnId) -> bool {
        self.conns.remove(&conn).is_some()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Check if no connection is live.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Check if a connection is live.
    pub fn contains(&self, conn: ConnId) -> bool {
        self.conns.contains_key(&conn)
    }

    /// Remote address of a connection.
    pub fn address(&self, conn: ConnId) -> Option<&str> {
        self.conns.get(&conn).map(|c| c.addr.as_str())
    }

    /// Handshake token of a connection.
    pub fn token(&self, conn: ConnId) -> Option<&str> {
        self.conns.get(&conn).and_then(|c| c.token.as_deref())
    }

    /// Ids of all live connections.
    pub fn connections(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.conns.keys().copied()
    }

    /// Queue a message for one connection.
    pub fn send(&self, conn: ConnId, msg: ServerMessage) {
        if let Some(c) = self.conns.get(&conn) {
            if c.outbox.send(Outbound::Message(msg)).is_err() {
                debug!("{} queue closed, dropping message", conn);
            }
        }
    }

    /// Queue a message for every connection.
    pub fn broadcast(&self, msg: &ServerMessage) {
        for (conn, c) in &self.conns {
            if c.outbox.send(Outbound::Message(msg.clone())).is_err() {
                debug!("{} queue closed, dropping broadcast", conn);
            }
        }
    }

    /// Deliver to a target.
    pub fn deliver(&self, target: Target, msg: ServerMessage) {
        match target {
            Target::Conn(conn) => self.send(conn, msg),
            Target::All => self.broadcast(&msg),
        }
    }

    /// Close a connection and forget it.
    pub fn disconnect(&mut self, conn: ConnId) {
        if let Some(c) = self.conns.remove(&conn) {
            let _ = c.outbox.send(Outbound::Close);
            debug!("{} disconnected by server", conn);
        }
    }
}
