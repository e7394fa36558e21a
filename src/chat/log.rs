//! Bounded chat history and line delivery.

use std::collections::VecDeque;

use tracing::debug;

use super::message::{ChatMessage, MessageKind};
use crate::hub::{Hub, Target};
use crate::identity::Identity;
use crate::moderation::CleanText;
use crate::web::ws::ServerMessage;

/// Ordered, capacity-bounded history with monotonic ids.
///
/// Ids are never reused, even after deletions or eviction.
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<ChatMessage>,
    capacity: usize,
    next_id: i64,
}

impl MessageLog {
    /// Create an empty log keeping at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Append a chat line from `author` and broadcast it.
    pub fn send_chat(&mut self, hub: &Hub, author: &Identity, content: &CleanText) -> ChatMessage {
        let msg = ChatMessage::chat(self.next_id, author.nick.as_str(), content.as_str());
        self.next_id += 1;

        hub.broadcast(&ServerMessage::line(msg.clone()));
        self.entries.push_back(msg.clone());
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!("evicted message {}", evicted.id);
            }
        }
        msg
    }

    /// Deliver a system line. System lines are never stored.
    pub fn send_system(&self, hub: &Hub, target: Target, kind: MessageKind, text: impl Into<String>) {
        hub.deliver(target, ServerMessage::line(ChatMessage::system(kind, text)));
    }

    /// Deliver any envelope.
    pub fn send(&self, hub: &Hub, target: Target, msg: ServerMessage) {
        hub.deliver(target, msg);
    }

    /// Retained messages, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove messages by id and broadcast the ids actually removed.
    pub fn delete_messages(&mut self, hub: &Hub, ids: &[i64]) -> Vec<i64> {
        let mut removed = Vec::new();
        self.entries.retain(|msg| {
            if ids.contains(&msg.id) {
                removed.push(msg.id);
                false
            } else {
                true
            }
        });

        if !removed.is_empty() {
            hub.broadcast(&ServerMessage::DeleteMessages {
                ids: removed.clone(),
            });
        }
        removed
    }

    /// Ids of retained messages whose author name matches, ignoring case.
    pub fn ids_by_author(&self, name: &str) -> Vec<i64> {
        let name = name.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|msg| msg.author_name().to_lowercase() == name)
            .map(|msg| msg.id)
            .collect()
    }
}
