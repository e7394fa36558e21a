//! The ban gate.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use super::SecurityError;
use crate::chat::{ChatMessage, MessageKind};
use crate::hub::Hub;
use crate::identity::{Identity, IdentityRegistry};
use crate::session::SessionState;
use crate::snapshot::SnapshotFile;
use crate::web::ws::ServerMessage;
use crate::Result;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of an address keyed by `pepper`.
pub fn hash_address(pepper: &str, address: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(pepper.as_bytes()).expect("HMAC accepts any key length");
    mac.update(address.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Persisted set of banned address digests.
#[derive(Debug, Default)]
pub struct BanGate {
    pepper: Option<String>,
    bans: HashMap<String, DateTime<Utc>>,
    store: Option<SnapshotFile>,
}

impl BanGate {
    /// Create a gate that never touches disk.
    pub fn in_memory(pepper: Option<String>) -> Self {
        Self {
            pepper,
            ..Self::default()
        }
    }

    /// Open the ban list stored at `path`.
    pub fn open(path: impl Into<PathBuf>, pepper: Option<String>) -> Result<Self> {
        let store = SnapshotFile::new(path);
        let pairs: Vec<(String, DateTime<Utc>)> = store.load()?;
        info!("loaded {} bans", pairs.len());
        Ok(Self {
            pepper,
            bans: pairs.into_iter().collect(),
            store: Some(store),
        })
    }

    fn save(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(self.bans.iter()) {
                warn!("failed to save bans to {}: {}", store.path().display(), e);
            }
        }
    }

    /// Check whether a pepper is configured.
    pub fn has_secret(&self) -> bool {
        self.pepper.is_some()
    }

    /// Number of banned digests.
    pub fn len(&self) -> usize {
        self.bans.len()
    }

    /// Check if nothing is banned.
    pub fn is_empty(&self) -> bool {
        self.bans.is_empty()
    }

    /// Digest an address with the configured pepper.
    pub fn hash(&self, address: &str) -> std::result::Result<String, SecurityError> {
        let pepper = self
            .pepper
            .as_deref()
            .ok_or(SecurityError::NoSecretConfigured)?;
        Ok(hash_address(pepper, address))
    }

    /// Check whether an address is banned.
    pub fn check_ban(&self, address: &str) -> std::result::Result<bool, SecurityError> {
        let digest = self.hash(address)?;
        Ok(self.bans.contains_key(&digest))
    }

    /// Ban an address directly.
    pub fn ban_address(&mut self, address: &str) -> std::result::Result<(), SecurityError> {
        let digest = self.hash(address)?;
        self.bans.insert(digest, Utc::now());
        self.save();
        Ok(())
    }

    /// Ban every live connection of an identity and delete the identity.
    ///
    /// Each connection's address is banned, the connection is told to drop
    /// its identity, then closed. Returns the number of connections closed.
    pub fn ban(
        &mut self,
        hub: &mut Hub,
        session: &mut SessionState,
        registry: &mut IdentityRegistry,
        identity: &Identity,
    ) -> std::result::Result<usize, SecurityError> {
        let conns = session.connections_of(&identity.id);
        if conns.is_empty() {
            return Err(SecurityError::NotConnected);
        }
        if !self.has_secret() {
            return Err(SecurityError::NoSecretConfigured);
        }

        let now = Utc::now();
        for &conn in &conns {
            match hub.address(conn) {
                Some(address) => {
                    let digest = self.hash(address)?;
                    self.bans.insert(digest, now);
                }
                None => warn!("{} has no address, not banned", conn),
            }
            hub.send(conn, ServerMessage::ResetIdentity);
            hub.send(
                conn,
                ServerMessage::line(ChatMessage::system(
                    MessageKind::Error,
                    "You have been banned.",
                )),
            );
            hub.disconnect(conn);
        }

        session.unbind_all(hub, &identity.id);
        if let Err(e) = registry.delete(&identity.id) {
            warn!("banned identity {} was already gone: {}", identity.id, e);
        }
        self.save();

        info!(
            "banned {} ({}) on {} connections",
            identity.name(),
            identity.id,
            conns.len()
        );
        Ok(conns.len())
    }
}
