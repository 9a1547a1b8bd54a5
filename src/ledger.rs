//! Loading and error bookkeeping for the conversation list and each
//! conversation's message history. Flags flip on at dispatch and off on the
//! terminal result, success or failure, so spinners can never wedge.

use std::collections::HashMap;

use crate::error::ChatError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListLoadState {
    pub is_loading: bool,
    pub last_error: Option<ChatError>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationLoadState {
    pub is_loading_messages: bool,
    /// At least one page has arrived; `load if not loaded` stops here.
    pub loaded_once: bool,
    /// The backward end of history was reached; sticky until a reset.
    pub all_messages_loaded: bool,
    pub last_error: Option<ChatError>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadLedger {
    pub conversation_list: ListLoadState,
    per_conversation: HashMap<String, ConversationLoadState>,
}

impl LoadLedger {
    /// Current load state for a conversation; absent entries read as idle.
    pub fn conversation(&self, conversation_id: &str) -> ConversationLoadState {
        self.per_conversation
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mark a message load as started. Returns false when one is already in
    /// flight, in which case the caller must not start another.
    pub fn begin_messages_load(&mut self, conversation_id: &str) -> bool {
        let slot = self
            .per_conversation
            .entry(conversation_id.to_string())
            .or_default();
        if slot.is_loading_messages {
            return false;
        }
        slot.is_loading_messages = true;
        slot.last_error = None;
        true
    }

    pub fn complete_messages_load(&mut self, conversation_id: &str, all_loaded: bool) {
        let slot = self
            .per_conversation
            .entry(conversation_id.to_string())
            .or_default();
        slot.is_loading_messages = false;
        slot.loaded_once = true;
        slot.all_messages_loaded = slot.all_messages_loaded || all_loaded;
        slot.last_error = None;
    }

    pub fn fail_messages_load(&mut self, conversation_id: &str, error: ChatError) {
        let slot = self
            .per_conversation
            .entry(conversation_id.to_string())
            .or_default();
        slot.is_loading_messages = false;
        slot.last_error = Some(error);
    }

    /// Same begin/complete/fail discipline for the conversation list itself.
    pub fn begin_list_load(&mut self) -> bool {
        if self.conversation_list.is_loading {
            return false;
        }
        self.conversation_list.is_loading = true;
        self.conversation_list.last_error = None;
        true
    }

    pub fn complete_list_load(&mut self) {
        self.conversation_list.is_loading = false;
        self.conversation_list.last_error = None;
    }

    pub fn fail_list_load(&mut self, error: ChatError) {
        self.conversation_list.is_loading = false;
        self.conversation_list.last_error = Some(error);
    }

    /// Move a slot from a locally synthesized conversation id to its server
    /// id. An existing slot under the server id wins.
    pub fn rekey(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(slot) = self.per_conversation.remove(from) {
            self.per_conversation.entry(to.to_string()).or_insert(slot);
        }
    }

    /// Drop slots for conversations that no longer exist.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.per_conversation.retain(|id, _| keep(id));
    }
}
