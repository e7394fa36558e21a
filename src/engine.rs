//! The room engine.
//!
//! One task owns every service and handles events in arrival order, so a
//! handler always runs to completion before the next event is looked at.
//! Sockets talk to it through an [`EngineHandle`]; the only work done off
//! the task is the emote catalog fetch, whose result comes back as an
//! [`EngineEvent::EmotesFetched`] event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::{MessageKind, MessageLog};
use crate::command::{dispatch, parse_input, ChatInput, CommandError, InputAction};
use crate::config::Config;
use crate::emote::{EmoteCatalog, EmoteError};
use crate::error::ErrorCategory;
use crate::hub::{ConnId, Hub, Outbox, Target};
use crate::identity::{Identity, IdentityRegistry};
use crate::moderation::{ModerationEngine, TextKind};
use crate::security::BanGate;
use crate::session::{SessionError, SessionState};
use crate::web::ws::ServerMessage;

/// Normalize a client token into an identity id.
///
/// Only UUIDs are accepted; they are returned in lower-case hyphenated form.
pub fn guest_id(token: &str) -> Option<String> {
    Uuid::parse_str(token.trim()).ok().map(|id| id.to_string())
}

/// Something that happened to the room.
#[derive(Debug)]
pub enum EngineEvent {
    /// A socket was accepted.
    Connected {
        /// New connection id.
        conn: ConnId,
        /// Remote IP address, without the port.
        addr: String,
        /// Handshake token, if the client sent one.
        token: Option<String>,
        /// Queue drained by the socket task.
        outbox: Outbox,
    },
    /// A line from a client.
    Input {
        /// Sender.
        conn: ConnId,
        /// Raw line.
        line: String,
    },
    /// A socket closed.
    Disconnected {
        /// Closed connection.
        conn: ConnId,
    },
    /// Idle sweep tick.
    Sweep,
    /// A catalog fetch finished.
    EmotesFetched {
        /// Connection that asked, if any.
        requester: Option<ConnId>,
        /// Requested set.
        set_id: String,
        /// Body or failure.
        result: Result<Value, EmoteError>,
    },
}

/// A catalog fetch waiting to be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteRequest {
    /// Connection to report the outcome to.
    pub requester: Option<ConnId>,
    /// Set to fetch.
    pub set_id: String,
}

/// Cloneable sender side of the engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
    next_conn: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Create a handle and the receiver the engine task reads.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            tx,
            next_conn: Arc::new(AtomicU64::new(1)),
        };
        (handle, rx)
    }

    /// Allocate a connection id.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    /// Post an event. Returns false once the engine has stopped.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// A handle that does not keep the engine alive.
    pub fn downgrade(&self) -> WeakEngineHandle {
        WeakEngineHandle {
            tx: self.tx.downgrade(),
            next_conn: Arc::clone(&self.next_conn),
        }
    }
}

/// Non-owning [`EngineHandle`], used by the engine's own background work.
#[derive(Debug, Clone)]
pub struct WeakEngineHandle {
    tx: mpsc::WeakUnboundedSender<EngineEvent>,
    next_conn: Arc<AtomicU64>,
}

impl WeakEngineHandle {
    /// `None` once every strong handle is gone.
    pub fn upgrade(&self) -> Option<EngineHandle> {
        Some(EngineHandle {
            tx: self.tx.upgrade()?,
            next_conn: Arc::clone(&self.next_conn),
        })
    }
}

/// Owner of all room state.
#[derive(Debug)]
pub struct Engine {
    /// Live connections.
    pub hub: Hub,
    /// Durable identities.
    pub registry: IdentityRegistry,
    /// Text and rate checks.
    pub moderation: ModerationEngine,
    /// Chat history.
    pub log: MessageLog,
    /// Bindings, announcement and emotes.
    pub session: SessionState,
    /// Address bans.
    pub bans: BanGate,
    catalog: Option<EmoteCatalog>,
    pending: Vec<EmoteRequest>,
}

impl Engine {
    /// Create an engine from its services.
    pub fn new(
        config: Config,
        registry: IdentityRegistry,
        moderation: ModerationEngine,
        bans: BanGate,
    ) -> Self {
        Self {
            hub: Hub::new(),
            registry,
            moderation,
            log: MessageLog::new(config.history_len),
            session: SessionState::new(config),
            bans,
            catalog: None,
            pending: Vec::new(),
        }
    }

    /// Attach the emote catalog client.
    pub fn with_catalog(mut self, catalog: EmoteCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        self.session.config()
    }

    /// Current registry record of the identity bound to `conn`.
    pub fn actor(&self, conn: ConnId) -> Option<Identity> {
        let bound = self.session.binding(conn)?;
        self.registry.get_by_id(&bound.id).cloned()
    }

    /// Handle one event to completion.
    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Connected {
                conn,
                addr,
                token,
                outbox,
            } => self.connect(conn, addr, token, outbox),
            EngineEvent::Input { conn, line } => {
                self.input(conn, &line);
            }
            EngineEvent::Disconnected { conn } => self.disconnect(conn),
            EngineEvent::Sweep => {
                self.sweep(Utc::now());
            }
            EngineEvent::EmotesFetched {
                requester,
                set_id,
                result,
            } => self.emotes_fetched(requester, &set_id, result),
        }
    }

    /// Admit a connection: ban check, greeting, replay, token resolution.
    pub fn connect(&mut self, conn: ConnId, addr: String, token: Option<String>, outbox: Outbox) {
        info!("{} connected from {}", conn, addr);
        self.hub.register(conn, addr.clone(), token.clone(), outbox);

        match self.bans.check_ban(&addr) {
            Ok(true) => {
                info!("{} refused: banned address", conn);
                self.hub.send(conn, ServerMessage::error("You have been banned."));
                self.hub.disconnect(conn);
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("ban check skipped for {}: {}", conn, e),
        }

        self.log.send_system(
            &self.hub,
            Target::Conn(conn),
            MessageKind::Welcome,
            format!("Welcome: {}", self.config().welcome_msg),
        );
        if !self.session.announcement().is_empty() {
            self.log.send_system(
                &self.hub,
                Target::Conn(conn),
                MessageKind::Announcement,
                format!("announcement: {}", self.session.announcement()),
            );
        }
        if !self.session.emotes().is_empty() {
            self.hub.send(
                conn,
                ServerMessage::Emotes {
                    emotes: self.session.emotes().clone(),
                },
            );
        }
        for msg in self.log.history() {
            self.hub.send(conn, ServerMessage::line(msg.clone()));
        }

        let known = token
            .as_deref()
            .and_then(guest_id)
            .and_then(|id| self.registry.get_by_id(&id).cloned());
        match known {
            Some(identity) => {
                let first = self.session.connections_of(&identity.id).is_empty();
                self.hub.send(
                    conn,
                    ServerMessage::Identity {
                        identity: identity.clone(),
                    },
                );
                self.session.bind(&self.hub, conn, identity.clone());
                if first {
                    self.log.send_system(
                        &self.hub,
                        Target::All,
                        MessageKind::Announcement,
                        format!("{} connected", identity.name()),
                    );
                }
            }
            None => {
                debug!("{} joined as a guest", conn);
                self.session.broadcast_presence(&self.hub);
            }
        }
    }

    /// Handle a line from a client and acknowledge it.
    pub fn input(&mut self, conn: ConnId, line: &str) -> InputAction {
        if !self.hub.contains(conn) {
            return InputAction::Keep;
        }

        let result = match parse_input(line) {
            ChatInput::Message(text) if text.is_empty() => Ok(InputAction::Keep),
            ChatInput::Message(text) => self.chat(conn, &text),
            ChatInput::Command(inv) => dispatch(self, conn, &inv),
        };

        let action = match result {
            Ok(action) => action,
            Err(e) => {
                match e.category() {
                    ErrorCategory::Authorization | ErrorCategory::Upstream => {
                        warn!("{}: {} ({})", conn, e, e.category())
                    }
                    category => debug!("{}: {} ({})", conn, e, category),
                }
                self.hub.send(conn, ServerMessage::error(e.to_string()));
                e.input_action()
            }
        };

        self.hub.send(
            conn,
            ServerMessage::Ack {
                clear: action.clears(),
            },
        );
        action
    }

    fn chat(&mut self, conn: ConnId, text: &str) -> Result<InputAction, CommandError> {
        let actor = self.actor(conn).ok_or(CommandError::NeedsIdentity("chat"))?;
        let clean = self
            .moderation
            .text_check(text, Some(&actor), TextKind::Chat)?;

        let updated = self.registry.set_last_action(&actor.id, Utc::now())?;
        self.session.refresh(&updated);
        self.log.send_chat(&self.hub, &updated, &clean);
        Ok(InputAction::Clear)
    }

    /// Forget a connection.
    pub fn disconnect(&mut self, conn: ConnId) {
        if self.hub.remove(conn) {
            info!("{} disconnected", conn);
        }

        match self.session.unbind(&self.hub, conn) {
            Some((identity, true)) => {
                self.log.send_system(
                    &self.hub,
                    Target::All,
                    MessageKind::Announcement,
                    format!("{} disconnected", identity.name()),
                );
            }
            Some((_, false)) => {}
            None => self.session.broadcast_presence(&self.hub),
        }
    }

    /// Run the idle sweep at `now`.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.session.sweep_idle(&self.hub, &mut self.registry, now)
    }

    /// Queue a catalog fetch. The run loop starts it after the current event.
    pub fn request_emotes(&mut self, requester: Option<ConnId>, set_id: String) {
        self.pending.push(EmoteRequest { requester, set_id });
    }

    /// Take the queued catalog fetches.
    pub fn take_emote_requests(&mut self) -> Vec<EmoteRequest> {
        std::mem::take(&mut self.pending)
    }

    /// Apply a finished catalog fetch and report to whoever asked.
    pub fn emotes_fetched(
        &mut self,
        requester: Option<ConnId>,
        set_id: &str,
        result: Result<Value, EmoteError>,
    ) {
        let outcome: Result<usize, SessionError> = match result {
            Ok(body) => self.session.apply_emotes(&self.hub, set_id, &body),
            Err(e) => Err(e.into()),
        };

        match (outcome, requester) {
            (Ok(_), Some(conn)) => {
                self.hub.send(conn, ServerMessage::info("emotes loaded"));
            }
            (Ok(count), None) => info!("loaded {} emotes from set {}", count, set_id),
            (Err(e), Some(conn)) => {
                warn!("emote set {} failed for {}: {}", set_id, conn, e);
                self.hub.send(conn, ServerMessage::error(e.to_string()));
            }
            (Err(e), None) => warn!("emote set {} failed: {}", set_id, e),
        }
    }

    /// Load the configured emote set before serving. Failures are logged.
    pub async fn load_startup_emotes(&mut self) {
        let set_id = match self.session.emote_set_id(None) {
            Ok(id) => id,
            Err(e) => {
                info!("no startup emotes: {}", e);
                return;
            }
        };
        let Some(catalog) = self.catalog.clone() else {
            warn!("no emote catalog configured, skipping set {}", set_id);
            return;
        };

        let result = catalog.fetch(&set_id).await;
        self.emotes_fetched(None, &set_id, result);
    }

    /// Process events until every handle is dropped.
    ///
    /// `handle` is only kept as a weak reference, so the caller's clones
    /// decide when the loop ends.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineEvent>, handle: EngineHandle) {
        let weak = handle.downgrade();
        drop(handle);
        info!("engine started");
        while let Some(event) = rx.recv().await {
            self.handle(event);

            for request in self.take_emote_requests() {
                let catalog = self.catalog.clone();
                let weak = weak.clone();
                tokio::spawn(async move {
                    let result = match catalog {
                        Some(catalog) => catalog.fetch(&request.set_id).await,
                        None => Err(EmoteError::Upstream(
                            "no emote catalog configured".to_string(),
                        )),
                    };
                    match weak.upgrade() {
                        Some(handle) => {
                            handle.send(EngineEvent::EmotesFetched {
                                requester: request.requester,
                                set_id: request.set_id,
                                result,
                            });
                        }
                        None => debug!("engine gone, dropping emote set {}", request.set_id),
                    }
                });
            }
        }
        info!("engine stopped");
    }
}
