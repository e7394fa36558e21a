//! Per-room session state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::presence::presence_rows;
use super::SessionError;
use crate::chat::{ChatMessage, MessageKind};
use crate::config::Config;
use crate::emote::{is_valid_set_id, parse_emote_set, EmoteError};
use crate::hub::{ConnId, Hub};
use crate::identity::{Identity, IdentityRegistry};
use crate::moderation::{cooldown, CleanText};
use crate::web::ws::ServerMessage;

/// Connection bindings plus the shared room state.
///
/// Each bound connection holds a snapshot of its identity. Snapshots of one
/// identity are refreshed together through [`SessionState::propagate`].
#[derive(Debug)]
pub struct SessionState {
    config: Config,
    bindings: HashMap<ConnId, Identity>,
    by_identity: HashMap<String, BTreeSet<ConnId>>,
    announcement: String,
    emotes: BTreeMap<String, String>,
}

impl SessionState {
    /// Create an empty session.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            bindings: HashMap::new(),
            by_identity: HashMap::new(),
            announcement: String::new(),
            emotes: BTreeMap::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current announcement; empty when none.
    pub fn announcement(&self) -> &str {
        &self.announcement
    }

    /// Current emote map.
    pub fn emotes(&self) -> &BTreeMap<String, String> {
        &self.emotes
    }

    /// Identity bound to a connection.
    pub fn binding(&self, conn: ConnId) -> Option<&Identity> {
        self.bindings.get(&conn)
    }

    /// Number of bound connections.
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Connections bound to an identity.
    pub fn connections_of(&self, id: &str) -> Vec<ConnId> {
        self.by_identity
            .get(id)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    fn detach(&mut self, conn: ConnId) -> Option<(Identity, bool)> {
        let identity = self.bindings.remove(&conn)?;
        let mut was_last = true;
        if let Some(conns) = self.by_identity.get_mut(&identity.id) {
            conns.remove(&conn);
            was_last = conns.is_empty();
            if was_last {
                self.by_identity.remove(&identity.id);
            }
        }
        Some((identity, was_last))
    }

    /// Bind a connection to an identity.
    ///
    /// Any previous binding of the connection is replaced and returned. The
    /// identity is pushed to the identity's other connections and presence
    /// is rebroadcast.
    pub fn bind(&mut self, hub: &Hub, conn: ConnId, identity: Identity) -> Option<Identity> {
        let previous = self.detach(conn).map(|(old, _)| old);

        self.by_identity
            .entry(identity.id.clone())
            .or_default()
            .insert(conn);
        self.bindings.insert(conn, identity.clone());
        debug!("{} bound to {}", conn, identity.id);

        for other in self.connections_of(&identity.id) {
            if other != conn {
                self.bindings.insert(other, identity.clone());
                hub.send(
                    other,
                    ServerMessage::Identity {
                        identity: identity.clone(),
                    },
                );
            }
        }

        self.broadcast_presence(hub);
        previous
    }

    /// Remove a connection's binding and rebroadcast presence.
    ///
    /// Returns the identity and whether this was its last binding.
    pub fn unbind(&mut self, hub: &Hub, conn: ConnId) -> Option<(Identity, bool)> {
        let removed = self.detach(conn);
        if removed.is_some() {
            self.broadcast_presence(hub);
        }
        removed
    }

    /// Remove every binding of an identity with one presence broadcast.
    pub fn unbind_all(&mut self, hub: &Hub, id: &str) -> Vec<ConnId> {
        let conns = self.connections_of(id);
        for conn in &conns {
            self.detach(*conn);
        }
        if !conns.is_empty() {
            self.broadcast_presence(hub);
        }
        conns
    }

    /// Refresh every binding of an identity and send it the new record.
    pub fn propagate(&mut self, hub: &Hub, identity: &Identity) {
        let conns = self.connections_of(&identity.id);
        if conns.is_empty() {
            return;
        }
        for conn in conns {
            self.bindings.insert(conn, identity.clone());
            hub.send(
                conn,
                ServerMessage::Identity {
                    identity: identity.clone(),
                },
            );
        }
        self.broadcast_presence(hub);
    }

    /// Refresh every binding of an identity without notifying anyone.
    pub fn refresh(&mut self, identity: &Identity) {
        for conn in self.connections_of(&identity.id) {
            self.bindings.insert(conn, identity.clone());
        }
    }

    /// Current presence list.
    pub fn presence(&self, hub: &Hub) -> ServerMessage {
        let identities = self
            .by_identity
            .values()
            .filter_map(|conns| conns.iter().next())
            .filter_map(|conn| self.bindings.get(conn));
        let lurkers = hub.len().saturating_sub(self.bindings.len());
        ServerMessage::Presence {
            users: presence_rows(identities, lurkers),
        }
    }

    /// Broadcast the presence list.
    pub fn broadcast_presence(&self, hub: &Hub) {
        hub.broadcast(&self.presence(hub));
    }

    /// Replace the announcement. Broadcast unless cleared.
    pub fn set_announcement(&mut self, hub: &Hub, text: &CleanText) -> Result<(), SessionError> {
        if self.announcement == text.as_str() {
            return Err(SessionError::Unchanged);
        }
        self.announcement = text.as_str().to_string();
        if !self.announcement.is_empty() {
            hub.broadcast(&ServerMessage::line(ChatMessage::system(
                MessageKind::Announcement,
                format!("announcement: {}", self.announcement),
            )));
        }
        info!("announcement set to {:?}", self.announcement);
        Ok(())
    }

    /// Resolve the set id to load: the requested one, else the configured one.
    pub fn emote_set_id(&self, requested: Option<&str>) -> Result<String, SessionError> {
        let id = requested
            .map(str::to_string)
            .or_else(|| self.config.emote_set.clone())
            .ok_or(EmoteError::NoEmoteSet)?;
        if !is_valid_set_id(&id) {
            return Err(EmoteError::InvalidId(id).into());
        }
        Ok(id)
    }

    /// Replace the emote cache from a fetched catalog body and broadcast it.
    ///
    /// The cache is untouched when the body is not an emote set.
    pub fn apply_emotes(&mut self, hub: &Hub, set_id: &str, body: &Value) -> Result<usize, SessionError> {
        let emotes = parse_emote_set(set_id, body)?;
        self.emotes = emotes;
        info!("cached {} emotes from set {}", self.emotes.len(), set_id);
        hub.broadcast(&ServerMessage::Emotes {
            emotes: self.emotes.clone(),
        });
        Ok(self.emotes.len())
    }

    /// Flag bound identities idle past the threshold as away.
    ///
    /// An identity is idle when both its last message and its last edit are
    /// older than the threshold. Presence is rebroadcast only when something
    /// changed. Returns the flagged ids.
    pub fn sweep_idle(
        &mut self,
        hub: &Hub,
        registry: &mut IdentityRegistry,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let cutoff = now - cooldown(self.config.afk_threshold_secs);

        let idle: Vec<String> = self
            .by_identity
            .keys()
            .filter_map(|id| registry.get_by_id(id))
            .filter(|identity| {
                !identity.is_afk
                    && identity.last_message < cutoff
                    && identity.last_changed < cutoff
            })
            .map(|identity| identity.id.clone())
            .collect();

        let mut flagged = Vec::new();
        for id in idle {
            match registry.set_afk(&id, true) {
                Ok(updated) => {
                    for conn in self.connections_of(&id) {
                        self.bindings.insert(conn, updated.clone());
                        hub.send(
                            conn,
                            ServerMessage::Identity {
                                identity: updated.clone(),
                            },
                        );
                    }
                    flagged.push(id);
                }
                Err(e) => warn!("idle sweep could not flag {}: {}", id, e),
            }
        }

        if !flagged.is_empty() {
            debug!("idle sweep flagged {} identities", flagged.len());
            self.broadcast_presence(hub);
        }
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Outbound;
    use crate::moderation::{FilterSet, ModerationEngine, TextKind};
    use crate::web::ws::PresenceEntry;
    use chrono::Duration;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Room {
        hub: Hub,
        rxs: Vec<mpsc::UnboundedReceiver<Outbound>>,
    }

    impl Room {
        fn with_connections(n: u64) -> Self {
            let mut hub = Hub::new();
            let mut rxs = Vec::new();
            for i in 0..n {
                let (tx, rx) = mpsc::unbounded_channel();
                hub.register(ConnId(i), "127.0.0.1", None, tx);
                rxs.push(rx);
            }
            Self { hub, rxs }
        }

        fn drain(&mut self, i: usize) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(Outbound::Message(msg)) = self.rxs[i].try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn clean(raw: &str, kind: TextKind) -> CleanText {
        ModerationEngine::new(&Config::default(), FilterSet::empty())
            .text_check(raw, None, kind)
            .unwrap()
    }

    fn last_presence(msgs: &[ServerMessage]) -> Vec<PresenceEntry> {
        msgs.iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::Presence { users } => Some(users.clone()),
                _ => None,
            })
            .expect("presence broadcast")
    }

    #[test]
    fn test_bind_broadcasts_presence_with_lurkers() {
        let mut room = Room::with_connections(3);
        let mut session = SessionState::new(Config::default());
        let rat = Identity::new("rat", "Rat", Utc::now());

        assert!(session.bind(&room.hub, ConnId(0), rat).is_none());

        let rows = last_presence(&room.drain(2));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], PresenceEntry::Lurkers { lurkers: 2 });
    }

    #[test]
    fn test_multi_device_is_one_row() {
        let mut room = Room::with_connections(2);
        let mut session = SessionState::new(Config::default());
        let rat = Identity::new("rat", "Rat", Utc::now());

        session.bind(&room.hub, ConnId(0), rat.clone());
        room.drain(0);
        session.bind(&room.hub, ConnId(1), rat.clone());

        // The first device is told about the identity again
        let first = room.drain(0);
        assert!(first
            .iter()
            .any(|m| matches!(m, ServerMessage::Identity { .. })));

        let rows = last_presence(&first);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], PresenceEntry::Lurkers { lurkers: 0 });
        assert_eq!(session.connections_of("rat"), vec![ConnId(0), ConnId(1)]);
    }

    #[test]
    fn test_unbind_reports_last_binding() {
        let room = Room::with_connections(2);
        let mut session = SessionState::new(Config::default());
        let rat = Identity::new("rat", "Rat", Utc::now());

        session.bind(&room.hub, ConnId(0), rat.clone());
        session.bind(&room.hub, ConnId(1), rat);

        let (_, last) = session.unbind(&room.hub, ConnId(0)).unwrap();
        assert!(!last);
        let (identity, last) = session.unbind(&room.hub, ConnId(1)).unwrap();
        assert!(last);
        assert_eq!(identity.id, "rat");
        assert!(session.unbind(&room.hub, ConnId(1)).is_none());
        assert_eq!(session.bound_count(), 0);
    }

    #[test]
    fn test_rebind_returns_previous() {
        let room = Room::with_connections(1);
        let mut session = SessionState::new(Config::default());

        session.bind(&room.hub, ConnId(0), Identity::new("a", "Rat", Utc::now()));
        let previous = session.bind(&room.hub, ConnId(0), Identity::new("b", "Mouse", Utc::now()));

        assert_eq!(previous.unwrap().id, "a");
        assert!(session.connections_of("a").is_empty());
        assert_eq!(session.binding(ConnId(0)).unwrap().id, "b");
    }

    #[test]
    fn test_propagate_updates_all_bindings() {
        let mut room = Room::with_connections(2);
        let mut session = SessionState::new(Config::default());
        let mut rat = Identity::new("rat", "Rat", Utc::now());
        session.bind(&room.hub, ConnId(0), rat.clone());
        session.bind(&room.hub, ConnId(1), rat.clone());
        room.drain(0);
        room.drain(1);

        rat.status = "eating".to_string();
        session.propagate(&room.hub, &rat);

        for i in 0..2 {
            let msgs = room.drain(i);
            assert!(msgs.contains(&ServerMessage::Identity {
                identity: rat.clone()
            }));
            assert_eq!(session.binding(ConnId(i as u64)).unwrap().status, "eating");
        }
    }

    #[test]
    fn test_announcement() {
        let mut room = Room::with_connections(1);
        let mut session = SessionState::new(Config::default());

        session
            .set_announcement(&room.hub, &clean("cheese day", TextKind::Announcement))
            .unwrap();
        assert_eq!(session.announcement(), "cheese day");
        let msgs = room.drain(0);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].type_name(), "announcement");
        assert_eq!(msgs[0].as_line().unwrap().content, "announcement: cheese day");

        assert_eq!(
            session.set_announcement(&room.hub, &clean("cheese day", TextKind::Announcement)),
            Err(SessionError::Unchanged)
        );

        session
            .set_announcement(&room.hub, &clean("", TextKind::Announcement))
            .unwrap();
        assert_eq!(session.announcement(), "");
        assert!(room.drain(0).is_empty());
    }

    #[test]
    fn test_emote_set_id_resolution() {
        let mut config = Config::default();
        let session = SessionState::new(config.clone());
        assert_eq!(
            session.emote_set_id(None),
            Err(SessionError::Emote(EmoteError::NoEmoteSet))
        );
        assert_eq!(session.emote_set_id(Some("abc")).unwrap(), "abc");
        assert!(session.emote_set_id(Some("a/b")).is_err());

        config.emote_set = Some("configured".to_string());
        let session = SessionState::new(config);
        assert_eq!(session.emote_set_id(None).unwrap(), "configured");
    }

    #[test]
    fn test_apply_emotes_replaces_wholesale() {
        let mut room = Room::with_connections(1);
        let mut session = SessionState::new(Config::default());

        let first = json!({ "emotes": [
            { "name": "a", "data": { "host": { "url": "//cdn/a" } } },
            { "name": "b", "data": { "host": { "url": "//cdn/b" } } }
        ]});
        assert_eq!(session.apply_emotes(&room.hub, "one", &first).unwrap(), 2);

        let second = json!({ "emotes": [
            { "name": "c", "data": { "host": { "url": "//cdn/c" } } }
        ]});
        session.apply_emotes(&room.hub, "two", &second).unwrap();
        assert_eq!(session.emotes().keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(room.drain(0).len(), 2);
    }

    #[test]
    fn test_apply_bad_shape_leaves_cache() {
        let mut room = Room::with_connections(1);
        let mut session = SessionState::new(Config::default());
        let good = json!({ "emotes": [
            { "name": "a", "data": { "host": { "url": "//cdn/a" } } }
        ]});
        session.apply_emotes(&room.hub, "one", &good).unwrap();
        room.drain(0);
        let before = session.emotes().clone();

        let result = session.apply_emotes(&room.hub, "bad", &json!({ "emotes": "nope" }));
        assert_eq!(
            result,
            Err(SessionError::Emote(EmoteError::InvalidId("bad".to_string())))
        );
        assert_eq!(session.emotes(), &before);
        assert!(room.drain(0).is_empty());
    }

    #[test]
    fn test_sweep_idle_requires_both_timestamps() {
        let mut room = Room::with_connections(2);
        let mut session = SessionState::new(Config::default());
        let mut registry = IdentityRegistry::in_memory();
        let now = Utc::now();
        let long_ago = now - Duration::hours(1);

        let idle = registry
            .set_nick_at(None, &clean("Idle", TextKind::Nick), long_ago)
            .unwrap();
        let chatty = registry
            .set_nick_at(None, &clean("Chatty", TextKind::Nick), long_ago)
            .unwrap();
        let chatty = registry.set_last_action(&chatty.id, now).unwrap();

        session.bind(&room.hub, ConnId(0), idle.clone());
        session.bind(&room.hub, ConnId(1), chatty.clone());
        room.drain(0);

        let flagged = session.sweep_idle(&room.hub, &mut registry, now);
        assert_eq!(flagged, vec![idle.id.clone()]);
        assert!(registry.get_by_id(&idle.id).unwrap().is_afk);
        assert!(!registry.get_by_id(&chatty.id).unwrap().is_afk);
        assert!(session.binding(ConnId(0)).unwrap().is_afk);

        let rows = last_presence(&room.drain(0));
        assert!(matches!(&rows[1], PresenceEntry::User { is_afk: true, .. }));

        // Nothing left to flag, nothing broadcast
        assert!(session.sweep_idle(&room.hub, &mut registry, now).is_empty());
        assert!(room.drain(0).is_empty());
    }
}
