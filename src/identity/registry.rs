//! The identity registry.
//!
//! Identities are keyed by id with a secondary index from lowercase name to
//! id. Every mutation rewrites the snapshot file; a failed write is logged
//! and the in-memory state stays authoritative.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{Identity, IdentityError};
use crate::moderation::CleanText;
use crate::snapshot::SnapshotFile;
use crate::Result;

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Durable identities plus the name index.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    users: HashMap<String, Identity>,
    names: HashMap<String, String>,
    store: Option<SnapshotFile>,
}

impl IdentityRegistry {
    /// Create a registry that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the registry stored at `path`.
    ///
    /// A missing file starts an empty registry. Entries whose nick lacks a
    /// valid color prefix are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = SnapshotFile::new(path);
        let pairs: Vec<(String, serde_json::Value)> = store.load()?;

        let mut registry = Self {
            users: HashMap::new(),
            names: HashMap::new(),
            store: Some(store),
        };

        for (id, value) in pairs {
            match serde_json::from_value::<Identity>(value) {
                Ok(identity) if identity.id != id => {
                    warn!("skipping identity {}: stored under key {}", identity.id, id);
                }
                Ok(identity) => {
                    let key = name_key(identity.name());
                    if registry.names.contains_key(&key) {
                        warn!("skipping identity {}: name {} already loaded", id, key);
                        continue;
                    }
                    registry.names.insert(key, id.clone());
                    registry.users.insert(id, identity);
                }
                Err(e) => warn!("skipping identity {}: {}", id, e),
            }
        }

        info!("loaded {} identities", registry.users.len());
        Ok(registry)
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(self.users.iter()) {
                warn!("failed to save identities to {}: {}", store.path().display(), e);
            }
        }
    }

    fn get_mut(&mut self, id: &str) -> std::result::Result<&mut Identity, IdentityError> {
        self.users
            .get_mut(id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Look up by id.
    pub fn get_by_id(&self, id: &str) -> Option<&Identity> {
        self.users.get(id)
    }

    /// Look up by name, ignoring case and surrounding whitespace.
    pub fn get_by_name(&self, name: &str) -> Option<&Identity> {
        self.names
            .get(&name_key(name))
            .and_then(|id| self.users.get(id))
    }

    /// Check whether nobody holds `name`.
    pub fn is_name_available(&self, name: &str) -> bool {
        !self.names.contains_key(&name_key(name))
    }

    /// Iterate over all identities.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.users.values()
    }

    /// Set a nick at the current time. See [`IdentityRegistry::set_nick_at`].
    pub fn set_nick(
        &mut self,
        id: Option<&str>,
        nick: &CleanText,
    ) -> std::result::Result<Identity, IdentityError> {
        self.set_nick_at(id, nick, Utc::now())
    }

    /// Rename an existing identity or create a new one.
    ///
    /// When `id` names a registered identity it is renamed and its color
    /// kept; a change of case only is allowed. Otherwise a new identity is
    /// created under `id`, or under a fresh UUID when `id` is `None`.
    pub fn set_nick_at(
        &mut self,
        id: Option<&str>,
        nick: &CleanText,
        now: DateTime<Utc>,
    ) -> std::result::Result<Identity, IdentityError> {
        let name = nick.as_str();
        let key = name_key(name);

        let id = match id {
            Some(id) if self.users.contains_key(id) => id,
            new_id => {
                if self.names.contains_key(&key) {
                    return Err(IdentityError::NameTaken);
                }
                let id = new_id
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let identity = Identity::new(id, name, now);
                self.names.insert(key, identity.id.clone());
                self.users.insert(identity.id.clone(), identity.clone());
                self.persist();
                info!("new identity {} ({})", name, identity.id);
                return Ok(identity);
            }
        };

        let current = self
            .users
            .get(id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;
        if current.name() == name {
            return Err(IdentityError::AlreadyNamed);
        }
        if let Some(owner) = self.names.get(&key) {
            if owner != id {
                return Err(IdentityError::NameTaken);
            }
        }

        let old_key = name_key(current.name());
        self.names.remove(&old_key);
        self.names.insert(key, id.to_string());

        let identity = self.get_mut(id)?;
        debug!("identity {} renamed {} -> {}", id, identity.name(), name);
        identity.nick = identity.nick.with_name(name);
        identity.last_changed = now;
        let updated = identity.clone();
        self.persist();
        Ok(updated)
    }

    /// Change the nick color.
    pub fn set_color(
        &mut self,
        id: &str,
        color: &CleanText,
    ) -> std::result::Result<Identity, IdentityError> {
        let identity = self.get_mut(id)?;
        identity.nick = identity.nick.with_color(color.as_str())?;
        identity.last_changed = Utc::now();
        let updated = identity.clone();
        self.persist();
        Ok(updated)
    }

    /// Change the status line.
    pub fn set_status(
        &mut self,
        id: &str,
        status: &CleanText,
    ) -> std::result::Result<Identity, IdentityError> {
        let identity = self.get_mut(id)?;
        identity.status = status.as_str().to_string();
        identity.last_changed = Utc::now();
        let updated = identity.clone();
        self.persist();
        Ok(updated)
    }

    /// Flip the away flag as a user action.
    pub fn toggle_afk(&mut self, id: &str) -> std::result::Result<Identity, IdentityError> {
        let identity = self.get_mut(id)?;
        identity.is_afk = !identity.is_afk;
        identity.last_changed = Utc::now();
        let updated = identity.clone();
        self.persist();
        Ok(updated)
    }

    /// Set the away flag without touching the edit timestamp.
    pub fn set_afk(
        &mut self,
        id: &str,
        is_afk: bool,
    ) -> std::result::Result<Identity, IdentityError> {
        let identity = self.get_mut(id)?;
        identity.is_afk = is_afk;
        let updated = identity.clone();
        self.persist();
        Ok(updated)
    }

    /// Set `last_message`. A future value times the identity out.
    pub fn set_last_action(
        &mut self,
        id: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<Identity, IdentityError> {
        let identity = self.get_mut(id)?;
        identity.last_message = at;
        let updated = identity.clone();
        self.persist();
        Ok(updated)
    }

    /// Grant or revoke moderator rights.
    pub fn set_moderator(
        &mut self,
        id: &str,
        is_mod: bool,
    ) -> std::result::Result<Identity, IdentityError> {
        let identity = self.get_mut(id)?;
        identity.is_mod = is_mod;
        let updated = identity.clone();
        self.persist();
        info!("identity {} moderator={}", id, is_mod);
        Ok(updated)
    }

    /// Remove an identity and free its name.
    pub fn delete(&mut self, id: &str) -> std::result::Result<Identity, IdentityError> {
        let identity = self
            .users
            .remove(id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;
        self.names.remove(&name_key(identity.name()));
        self.persist();
        info!("identity {} deleted", id);
        Ok(identity)
    }
}
