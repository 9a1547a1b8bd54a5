use crate::error::ChatError;
use crate::identity::SessionIdentity;
use crate::ledger::LoadLedger;
use crate::store::{ConversationStore, MessageStore};

/// Display name for the app's built-in AI assistant conversation.
pub const AI_CONVERSATION_NAME: &str = "Banter AI";

/// Id prefix of optimistic messages that have not been confirmed yet.
pub const TEMP_MESSAGE_PREFIX: &str = "tmp-msg-";

/// Id prefix of locally synthesized conversations awaiting a server identity.
pub const TEMP_CONVERSATION_PREFIX: &str = "tmp-conv-";

/// True for ids minted locally (optimistic messages, draft conversations).
/// The service never issues ids in this namespace.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with("tmp-")
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    AiBot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub name: String,
    pub created_at: i64,
    /// Denormalized pointer into the message store for list previews.
    pub last_message_id: Option<String>,
    /// Drives most-recently-active ordering; falls back to `created_at`.
    pub last_activity_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageStatus {
    Sending,
    Sent,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    pub reacted_by_me: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub status: MessageStatus,
    /// Why the last operation on this message failed, if it did.
    pub error: Option<ChatError>,
    pub reactions: Vec<Reaction>,
    pub media_url: Option<String>,
    pub gif_url: Option<String>,
}

impl Message {
    pub fn is_temp(&self) -> bool {
        is_temp_id(&self.id)
    }
}

/// Snapshot of everything the chat UI renders. Committed whole after each
/// state transition; readers never observe a half-applied change.
#[derive(Clone, Debug)]
pub struct ChatState {
    pub rev: u64,
    pub conversations: ConversationStore,
    pub messages: MessageStore,
    pub ledger: LoadLedger,
    pub identity: SessionIdentity,
    pub selected_conversation_id: Option<String>,
    /// Set when an anonymous send was refused pending login.
    pub login_required: bool,
    /// Non-blocking notification text; stays until explicitly cleared.
    pub notice: Option<String>,
}

impl ChatState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            conversations: ConversationStore::default(),
            messages: MessageStore::default(),
            ledger: LoadLedger::default(),
            identity: SessionIdentity::default(),
            selected_conversation_id: None,
            login_required: false,
            notice: None,
        }
    }

    /// Conversations ordered most recently active first. Ties break on id so
    /// the ordering is stable across snapshots.
    pub fn conversations_by_activity(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.conversations.iter().cloned().collect();
        list.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    /// Messages of one conversation in ascending `created_at` order, ties by id.
    pub fn messages_for(&self, conversation_id: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        messages
    }

    /// A selection pointing at an unknown conversation reads as no selection.
    pub fn selected_conversation(&self) -> Option<Conversation> {
        self.selected_conversation_id
            .as_deref()
            .and_then(|id| self.conversations.get(id))
            .cloned()
    }

    /// The AIBot conversation for the current identity, if any. A confirmed
    /// server conversation wins over a locally synthesized draft.
    pub fn ai_conversation(&self) -> Option<&Conversation> {
        let mut draft = None;
        for conversation in self
            .conversations
            .iter()
            .filter(|c| c.kind == ConversationKind::AiBot)
        {
            if !is_temp_id(&conversation.id) {
                return Some(conversation);
            }
            if draft.is_none() {
                draft = Some(conversation);
            }
        }
        draft
    }

    pub fn is_sending(&self, temp_id: &str) -> bool {
        self.messages
            .get(temp_id)
            .map(|m| m.status == MessageStatus::Sending)
            .unwrap_or(false)
    }
}

/// Epoch milliseconds now.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(id: &str, kind: ConversationKind, last_activity_at: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind,
            name: id.to_string(),
            created_at: 0,
            last_message_id: None,
            last_activity_at,
        }
    }

    fn message(id: &str, conversation_id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: "user-1".to_string(),
            content: "hi".to_string(),
            created_at,
            status: MessageStatus::Sent,
            error: None,
            reactions: vec![],
            media_url: None,
            gif_url: None,
        }
    }

    #[test]
    fn conversations_order_by_recent_activity_then_id() {
        let mut state = ChatState::empty();
        state
            .conversations
            .upsert(conversation("b", ConversationKind::Direct, 10));
        state
            .conversations
            .upsert(conversation("a", ConversationKind::Direct, 10));
        state
            .conversations
            .upsert(conversation("c", ConversationKind::Direct, 30));

        let ids: Vec<String> = state
            .conversations_by_activity()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn messages_for_filters_and_sorts_chronologically() {
        let mut state = ChatState::empty();
        state.messages.upsert(message("m2", "conv-1", 20));
        state.messages.upsert(message("m1", "conv-1", 10));
        state.messages.upsert(message("other", "conv-2", 5));
        // Same timestamp: id decides, deterministically.
        state.messages.upsert(message("m3", "conv-1", 20));

        let ids: Vec<String> = state
            .messages_for("conv-1")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn unknown_selection_reads_as_none() {
        let mut state = ChatState::empty();
        state.selected_conversation_id = Some("ghost".to_string());
        assert!(state.selected_conversation().is_none());
    }

    #[test]
    fn ai_conversation_prefers_confirmed_over_draft() {
        let mut state = ChatState::empty();
        state
            .conversations
            .upsert(conversation("tmp-conv-1", ConversationKind::AiBot, 5));
        assert_eq!(state.ai_conversation().unwrap().id, "tmp-conv-1");

        state
            .conversations
            .upsert(conversation("conv-ai", ConversationKind::AiBot, 1));
        assert_eq!(state.ai_conversation().unwrap().id, "conv-ai");
    }

    #[test]
    fn is_sending_tracks_status() {
        let mut state = ChatState::empty();
        let mut m = message("tmp-msg-0-abc", "conv-1", 10);
        m.status = MessageStatus::Sending;
        state.messages.upsert(m);

        assert!(state.is_sending("tmp-msg-0-abc"));
        assert!(!state.is_sending("missing"));
    }
}
