//! Conversation projection
//!
//! Conversations are never stored. They are recomputed from the message set
//! whenever it changes.

use crate::domain::message::entity::Message;
use crate::domain::message::store::MessageStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages exchanged with one counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub counterpart: String,
    pub last_message: Message,
    pub unread_count: usize,
    pub message_count: usize,
}

/// Group messages into conversations, most recent first.
///
/// The last message of a conversation is the one with the greatest
/// `sent_at`; among equal timestamps the later arrival wins. Conversations
/// with equal last timestamps keep the order they were first seen in.
pub fn project(messages: &[Message]) -> Vec<Conversation> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut conversations: Vec<Conversation> = Vec::new();

    for message in messages {
        let counterpart = message.counterpart();
        match index.get(counterpart) {
            Some(&i) => {
                let conversation = &mut conversations[i];
                conversation.message_count += 1;
                if message.is_unread() {
                    conversation.unread_count += 1;
                }
                if message.sent_at >= conversation.last_message.sent_at {
                    conversation.last_message = message.clone();
                }
            }
            None => {
                index.insert(counterpart, conversations.len());
                conversations.push(Conversation {
                    counterpart: counterpart.to_string(),
                    last_message: message.clone(),
                    unread_count: usize::from(message.is_unread()),
                    message_count: 1,
                });
            }
        }
    }

    // sort_by is stable
    conversations.sort_by(|a, b| b.last_message.sent_at.cmp(&a.last_message.sent_at));
    conversations
}

/// Memoized projection over a [`MessageStore`]
#[derive(Debug, Default)]
pub struct ConversationAggregator {
    cached: Option<(u64, Vec<Conversation>)>,
}

impl ConversationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current conversations, recomputed only when the store has changed
    pub fn conversations(&mut self, store: &MessageStore) -> &[Conversation] {
        let revision = store.revision();
        let stale = !matches!(&self.cached, Some((cached_rev, _)) if *cached_rev == revision);
        if stale {
            self.cached = Some((revision, project(store.messages())));
        }
        match &self.cached {
            Some((_, conversations)) => conversations,
            None => &[],
        }
    }

    pub fn total_unread(&mut self, store: &MessageStore) -> usize {
        self.conversations(store).iter().map(|c| c.unread_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::entity::{DeliveryStatus, MessageDirection};
    use crate::domain::shared::value_objects::MessageId;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn msg(id: &str, direction: MessageDirection, from: &str, to: &str, minute: u32) -> Message {
        Message {
            id: MessageId::new(id),
            direction,
            from: from.to_string(),
            to: to.to_string(),
            body: id.to_string(),
            sent_at: at(minute),
            status: DeliveryStatus::Delivered,
            read_at: None,
        }
    }

    #[test]
    fn test_inbound_and_reply_form_one_conversation() {
        let messages = vec![
            msg("m1", MessageDirection::Inbound, "+1", "+2", 1),
            msg("m2", MessageDirection::Outbound, "+2", "+1", 2),
        ];

        let conversations = project(&messages);

        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].counterpart, "+1");
        assert_eq!(conversations[0].last_message.id, MessageId::new("m2"));
        assert_eq!(conversations[0].unread_count, 1);
        assert_eq!(conversations[0].message_count, 2);
    }

    #[test]
    fn test_every_message_lands_in_exactly_one_conversation() {
        let messages = vec![
            msg("a", MessageDirection::Inbound, "+10", "+1", 1),
            msg("b", MessageDirection::Outbound, "+1", "+20", 2),
            msg("c", MessageDirection::Outbound, "+1", "+10", 3),
            msg("d", MessageDirection::Inbound, "+30", "+1", 4),
            msg("e", MessageDirection::Inbound, "+20", "+1", 0),
        ];

        let conversations = project(&messages);

        assert_eq!(conversations.len(), 3);
        let total: usize = conversations.iter().map(|c| c.message_count).sum();
        assert_eq!(total, messages.len());
    }

    #[test]
    fn test_sorted_by_recency() {
        let messages = vec![
            msg("old", MessageDirection::Inbound, "+10", "+1", 1),
            msg("new", MessageDirection::Inbound, "+20", "+1", 9),
            msg("mid", MessageDirection::Inbound, "+30", "+1", 5),
        ];

        let order: Vec<_> = project(&messages).into_iter().map(|c| c.counterpart).collect();
        assert_eq!(order, vec!["+20", "+30", "+10"]);
    }

    #[test]
    fn test_timestamp_tie_prefers_later_arrival() {
        let messages = vec![
            msg("first", MessageDirection::Inbound, "+10", "+1", 3),
            msg("second", MessageDirection::Outbound, "+1", "+10", 3),
        ];

        let conversations = project(&messages);
        assert_eq!(conversations[0].last_message.id, MessageId::new("second"));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let messages = vec![
            msg("a", MessageDirection::Inbound, "+10", "+1", 2),
            msg("b", MessageDirection::Inbound, "+20", "+1", 2),
        ];

        assert_eq!(project(&messages), project(&messages));
        let order: Vec<_> = project(&messages).into_iter().map(|c| c.counterpart).collect();
        assert_eq!(order, vec!["+10", "+20"]);
        assert!(project(&[]).is_empty());
    }

    #[test]
    fn test_aggregator_recomputes_on_change() {
        let mut store = MessageStore::default();
        let mut aggregator = ConversationAggregator::new();
        store.merge(msg("a", MessageDirection::Inbound, "+10", "+1", 2));

        assert_eq!(aggregator.conversations(&store).len(), 1);
        assert_eq!(aggregator.total_unread(&store), 1);

        store.merge(msg("b", MessageDirection::Inbound, "+20", "+1", 3));
        assert_eq!(aggregator.conversations(&store).len(), 2);

        store.mark_conversation_read("+10", at(30));
        store.mark_conversation_read("+20", at(30));
        assert_eq!(aggregator.total_unread(&store), 0);
        store.mark_conversation_read("+10", at(31));
        assert_eq!(aggregator.total_unread(&store), 0);
    }
}
