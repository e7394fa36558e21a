//! Test helpers for room tests.
//!
//! Provides a `TestRoom` that drives an `Engine` directly, with one queue
//! per fake connection.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc;

use parlor::moderation::FilterSet;
use parlor::web::ws::{PresenceEntry, ServerMessage};
use parlor::{
    BanGate, Config, ConnId, Engine, Identity, IdentityRegistry, InputAction, ModerationEngine,
    Outbound,
};

/// Pepper used by every test room.
pub const TEST_PEPPER: &str = "test-pepper";

/// Config with chat slow mode off, so tests can send freely.
pub fn test_config() -> Config {
    Config {
        slow_mode_secs: 0,
        history_len: 50,
        ..Config::default()
    }
}

/// An engine plus the receiving ends of its connections.
pub struct TestRoom {
    pub engine: Engine,
    queues: BTreeMap<ConnId, mpsc::UnboundedReceiver<Outbound>>,
    closed: BTreeSet<ConnId>,
    next: u64,
}

impl TestRoom {
    /// Room with the test config and an in-memory registry.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Room with the given config.
    pub fn with_config(config: Config) -> Self {
        let moderation = ModerationEngine::new(&config, FilterSet::empty());
        let engine = Engine::new(
            config,
            IdentityRegistry::in_memory(),
            moderation,
            BanGate::in_memory(Some(TEST_PEPPER.to_string())),
        );
        Self::with_engine(engine)
    }

    /// Room around a prepared engine.
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            queues: BTreeMap::new(),
            closed: BTreeSet::new(),
            next: 1,
        }
    }

    /// Connect from a fresh address.
    pub fn connect(&mut self, token: Option<&str>) -> ConnId {
        let addr = format!("10.0.0.{}", self.next);
        self.connect_from(&addr, token)
    }

    /// Connect from a given address.
    pub fn connect_from(&mut self, addr: &str, token: Option<&str>) -> ConnId {
        let conn = ConnId(self.next);
        self.next += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.insert(conn, rx);
        self.engine
            .connect(conn, addr.to_string(), token.map(str::to_string), tx);
        conn
    }

    /// Send a line as `conn`.
    pub fn send(&mut self, conn: ConnId, line: &str) -> InputAction {
        self.engine.input(conn, line)
    }

    /// Close a connection from the client side.
    pub fn disconnect(&mut self, conn: ConnId) {
        self.engine.disconnect(conn);
    }

    /// Messages queued for `conn` since the last drain.
    pub fn drain(&mut self, conn: ConnId) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        if let Some(rx) = self.queues.get_mut(&conn) {
            while let Ok(item) = rx.try_recv() {
                match item {
                    Outbound::Message(msg) => out.push(msg),
                    Outbound::Close => {
                        self.closed.insert(conn);
                    }
                }
            }
        }
        out
    }

    /// Drain every connection.
    pub fn drain_all(&mut self) {
        let conns: Vec<ConnId> = self.queues.keys().copied().collect();
        for conn in conns {
            self.drain(conn);
        }
    }

    /// Check whether the server closed `conn`. Drains it first.
    pub fn was_closed(&mut self, conn: ConnId) -> bool {
        self.drain(conn);
        self.closed.contains(&conn)
    }

    /// Connect and pick a nickname.
    pub fn named(&mut self, name: &str) -> (ConnId, Identity) {
        let conn = self.connect(None);
        assert_eq!(self.send(conn, &format!("/nick {name}")), InputAction::Clear);
        let identity = self.engine.actor(conn).expect("nick was accepted");
        self.drain_all();
        (conn, identity)
    }

    /// Connect, pick a nickname and become moderator.
    pub fn moderator(&mut self, name: &str) -> (ConnId, Identity) {
        let (conn, identity) = self.named(name);
        let identity = self
            .engine
            .registry
            .set_moderator(&identity.id, true)
            .expect("identity exists");
        (conn, identity)
    }
}

/// Contents of every line envelope.
pub fn lines(msgs: &[ServerMessage]) -> Vec<String> {
    msgs.iter()
        .filter_map(|m| m.as_line())
        .map(|line| line.content.clone())
        .collect()
}

/// Contents of error lines only.
pub fn errors(msgs: &[ServerMessage]) -> Vec<String> {
    msgs.iter()
        .filter(|m| m.type_name() == "error")
        .filter_map(|m| m.as_line())
        .map(|line| line.content.clone())
        .collect()
}

/// The last presence list in `msgs`.
pub fn last_presence(msgs: &[ServerMessage]) -> Option<Vec<PresenceEntry>> {
    msgs.iter().rev().find_map(|m| match m {
        ServerMessage::Presence { users } => Some(users.clone()),
        _ => None,
    })
}
