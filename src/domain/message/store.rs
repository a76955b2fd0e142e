//! Message store
//!
//! The single message set that optimistic inserts, HTTP responses, push
//! events and poll snapshots all merge into. Merging is keyed by message id
//! and is idempotent and order-independent: applying the same confirmed
//! message twice, or applying it before its optimistic counterpart has been
//! confirmed, converges to the same set.

use crate::domain::message::entity::{DeliveryStatus, Message, MessageDirection};
use crate::domain::shared::value_objects::MessageId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Default window within which a confirmed message may claim an optimistic one
pub const DEFAULT_MATCH_WINDOW_SECS: i64 = 120;

/// What a merge did to the set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New message appended
    Inserted,
    /// Replaced the optimistic message with this temporary id
    Reconciled(MessageId),
    /// Existing message's status or read marker advanced
    Updated,
    /// Already known, nothing changed
    Unchanged,
    /// Message was deleted locally and is not resurrected
    Suppressed,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            MergeOutcome::Inserted | MergeOutcome::Reconciled(_) | MergeOutcome::Updated
        )
    }
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    /// Messages in arrival order
    messages: Vec<Message>,
    /// Ids deleted by the user
    tombstones: HashSet<MessageId>,
    match_window: Duration,
    revision: u64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_MATCH_WINDOW_SECS))
    }
}

impl MessageStore {
    pub fn new(match_window: Duration) -> Self {
        Self {
            messages: Vec::new(),
            tombstones: HashSet::new(),
            match_window,
            revision: 0,
        }
    }

    /// Monotonic counter bumped on every change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Messages exchanged with `counterpart`, oldest first
    pub fn thread(&self, counterpart: &str) -> Vec<&Message> {
        let mut thread: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.counterpart() == counterpart)
            .collect();
        thread.sort_by_key(|m| m.sent_at);
        thread
    }

    /// Show a send before the provider has confirmed it
    pub fn insert_optimistic(&mut self, message: Message) {
        debug!("Optimistic insert {} to {}", message.id, message.counterpart());
        self.messages.push(message);
        self.bump();
    }

    /// Merge a message reported by the provider
    pub fn merge(&mut self, incoming: Message) -> MergeOutcome {
        if self.tombstones.contains(&incoming.id) {
            return MergeOutcome::Suppressed;
        }

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == incoming.id) {
            let status = existing.status.merge(incoming.status);
            let read_at = existing.read_at.or(incoming.read_at);
            if status == existing.status && read_at == existing.read_at {
                return MergeOutcome::Unchanged;
            }
            existing.status = status;
            existing.read_at = read_at;
            self.bump();
            return MergeOutcome::Updated;
        }

        if !incoming.is_optimistic() {
            if let Some(index) = self.find_optimistic_match(&incoming) {
                let temp_id = self.messages[index].id.clone();
                debug!("Reconciled optimistic {} with {}", temp_id, incoming.id);
                self.messages[index] = incoming;
                self.bump();
                return MergeOutcome::Reconciled(temp_id);
            }
        }

        self.messages.push(incoming);
        self.bump();
        MergeOutcome::Inserted
    }

    pub fn merge_all(&mut self, incoming: impl IntoIterator<Item = Message>) -> Vec<MergeOutcome> {
        incoming.into_iter().map(|m| self.merge(m)).collect()
    }

    /// Replace an optimistic message with the provider's confirmed copy.
    ///
    /// If a push event already delivered the confirmed copy, the optimistic
    /// one is dropped and the confirmed one merged as usual.
    pub fn confirm(&mut self, temp_id: &MessageId, confirmed: Message) -> MergeOutcome {
        let temp_index = self.messages.iter().position(|m| &m.id == temp_id);
        let already_known = self.messages.iter().any(|m| m.id == confirmed.id);

        match temp_index {
            Some(index) if !already_known && !self.tombstones.contains(&confirmed.id) => {
                self.messages[index] = confirmed;
                self.bump();
                MergeOutcome::Reconciled(temp_id.clone())
            }
            Some(index) => {
                self.messages.remove(index);
                self.bump();
                self.merge(confirmed);
                MergeOutcome::Reconciled(temp_id.clone())
            }
            None => self.merge(confirmed),
        }
    }

    /// Drop an optimistic message whose send failed
    pub fn rollback(&mut self, temp_id: &MessageId) -> bool {
        match self.messages.iter().position(|m| &m.id == temp_id) {
            Some(index) => {
                self.messages.remove(index);
                self.bump();
                true
            }
            None => false,
        }
    }

    pub fn update_status(&mut self, id: &MessageId, status: DeliveryStatus) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        let merged = message.status.merge(status);
        if merged == message.status {
            return false;
        }
        message.status = merged;
        self.bump();
        true
    }

    /// Mark every inbound message from `counterpart` up to `now` as read.
    ///
    /// Returns how many messages changed; zero on a repeated call.
    pub fn mark_conversation_read(&mut self, counterpart: &str, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for message in self.messages.iter_mut() {
            if message.direction == MessageDirection::Inbound
                && message.read_at.is_none()
                && message.from == counterpart
                && message.sent_at <= now
            {
                message.read_at = Some(now);
                changed += 1;
            }
        }
        if changed > 0 {
            self.bump();
        }
        changed
    }

    /// Permanently remove a message
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| &m.id == id)?;
        let removed = self.messages.remove(index);
        if !id.is_temporary() {
            self.tombstones.insert(id.clone());
        }
        self.bump();
        Some(removed)
    }

    /// Permanently remove every message exchanged with `counterpart`
    pub fn remove_conversation(&mut self, counterpart: &str) -> usize {
        let before = self.messages.len();
        let tombstones = &mut self.tombstones;
        self.messages.retain(|m| {
            if m.counterpart() != counterpart {
                return true;
            }
            if !m.id.is_temporary() {
                tombstones.insert(m.id.clone());
            }
            false
        });
        let removed = before - self.messages.len();
        if removed > 0 {
            self.bump();
        }
        removed
    }

    fn find_optimistic_match(&self, confirmed: &Message) -> Option<usize> {
        if confirmed.direction != MessageDirection::Outbound {
            return None;
        }
        self.messages.iter().position(|m| {
            m.is_optimistic()
                && m.direction == MessageDirection::Outbound
                && m.counterpart() == confirmed.counterpart()
                && m.body == confirmed.body
                && (m.sent_at - confirmed.sent_at).abs() <= self.match_window
        })
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
