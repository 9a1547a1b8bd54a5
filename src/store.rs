//! Normalized, id-keyed entity collections. Upserts replace the whole entity
//! (last write wins); operations on absent ids are no-ops, never errors.

use std::collections::HashMap;

use crate::state::{Conversation, Message};

#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    by_id: HashMap<String, Conversation>,
}

impl ConversationStore {
    pub fn upsert(&mut self, conversation: Conversation) {
        self.by_id.insert(conversation.id.clone(), conversation);
    }

    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        self.by_id.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.by_id.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Keep only conversations the predicate accepts.
    pub fn retain(&mut self, keep: impl Fn(&Conversation) -> bool) {
        self.by_id.retain(|_, c| keep(c));
    }
}

#[derive(Clone, Debug, Default)]
pub struct MessageStore {
    by_id: HashMap<String, Message>,
}

impl MessageStore {
    pub fn upsert(&mut self, message: Message) {
        self.by_id.insert(message.id.clone(), message);
    }

    pub fn upsert_many(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.upsert(message);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        self.by_id.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.by_id.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Swap an optimistic message for its confirmed replacement(s) in one
    /// step. No snapshot is taken between the remove and the upserts, so
    /// observers never see both representations or neither.
    ///
    /// Still inserts the confirmed messages when the optimistic one is
    /// already gone.
    pub fn remove_then_upsert(&mut self, temp_id: &str, confirmed: Vec<Message>) {
        self.by_id.remove(temp_id);
        self.upsert_many(confirmed);
    }

    /// Keep only messages the predicate accepts.
    pub fn retain(&mut self, keep: impl Fn(&Message) -> bool) {
        self.by_id.retain(|_, m| keep(m));
    }

    /// Move every message of one conversation under a different conversation
    /// id. Used when a locally synthesized conversation learns its server id.
    pub fn rekey_conversation(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        for message in self.by_id.values_mut() {
            if message.conversation_id == from {
                message.conversation_id = to.to_string();
            }
        }
    }
}
