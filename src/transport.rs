//! Boundary to the remote chat service. The engine owns no HTTP client;
//! an implementation of [`ChatTransport`] is injected at construction and
//! every call either yields wire DTOs or a structured [`ChatError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::state::{Conversation, ConversationKind, Message, MessageStatus, Reaction};

/// Wire shape of a conversation as the service returns it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationDto {
    pub id: String,
    pub kind: ConversationKind,
    pub name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub last_message: Option<MessageDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageDto {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub reactions: Vec<ReactionDto>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub gif_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReactionDto {
    pub emoji: String,
    pub count: u32,
    #[serde(default)]
    pub reacted_by_me: bool,
}

/// One page of history, oldest first within the page.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<MessageDto>,
    /// Set when the service states it explicitly; otherwise the end of
    /// history is inferred from a short page.
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// User echo plus bot reply returned by an authenticated AI send.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AiExchange {
    pub user_message: MessageDto,
    pub bot_reply: MessageDto,
}

/// Outcome of an anonymous AI send. Hitting the anonymous rate limit is not a
/// transport failure; it is a first-class outcome the UI answers by offering
/// login, while the optimistic message stays pending.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum GuestSendOutcome {
    Delivered {
        user_message: MessageDto,
        ai_reply: MessageDto,
        /// Server-issued guest session id; repeated on every delivered reply.
        guest_session_id: String,
    },
    LoginRequired,
}

/// Fields of an outgoing authenticated message.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingMessage {
    pub content: String,
    pub media_url: Option<String>,
    pub gif_url: Option<String>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn list_conversations(&self) -> Result<Vec<ConversationDto>, ChatError>;

    async fn start_conversation(
        &self,
        kind: ConversationKind,
        target_user_id: Option<&str>,
        seed_content: Option<&str>,
    ) -> Result<ConversationDto, ChatError>;

    /// Fetch messages older than `before_message_id` (or the newest page when
    /// `None`), at most `limit` of them.
    async fn get_messages(
        &self,
        conversation_id: &str,
        before_message_id: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage, ChatError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<MessageDto, ChatError>;

    async fn send_ai_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<AiExchange, ChatError>;

    /// Anonymous AI send. Passes the guest session id from an earlier
    /// exchange when one exists so the service can thread the history.
    async fn send_guest_ai_message(
        &self,
        content: &str,
        guest_session_id: Option<&str>,
    ) -> Result<GuestSendOutcome, ChatError>;

    /// Attach the named guest session's history to the authenticated account.
    async fn associate_guest_session(&self, guest_session_id: &str) -> Result<(), ChatError>;

    async fn edit_message(&self, message_id: &str, content: &str)
        -> Result<MessageDto, ChatError>;

    async fn delete_message(&self, message_id: &str) -> Result<(), ChatError>;

    /// `active` is the state after the toggle: true adds the reaction,
    /// false withdraws it.
    async fn react_to_message(
        &self,
        message_id: &str,
        emoji: &str,
        active: bool,
    ) -> Result<(), ChatError>;

    async fn report_message(&self, message_id: &str, reason: &str) -> Result<(), ChatError>;
}

impl ReactionDto {
    pub fn into_reaction(self) -> Reaction {
        Reaction {
            emoji: self.emoji,
            count: self.count,
            reacted_by_me: self.reacted_by_me,
        }
    }
}

impl MessageDto {
    /// Confirmed server message to cache entity. Status is always `Sent`:
    /// anything the wire returns has been accepted, and the sender is the
    /// wire's, never the local anonymous placeholder.
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            created_at: self.created_at,
            status: MessageStatus::Sent,
            error: None,
            reactions: self
                .reactions
                .into_iter()
                .map(ReactionDto::into_reaction)
                .collect(),
            media_url: self.media_url,
            gif_url: self.gif_url,
        }
    }
}

impl ConversationDto {
    /// Split into the conversation entity and its denormalized preview
    /// message, which belongs in the message store.
    pub fn into_parts(self) -> (Conversation, Option<Message>) {
        let preview = self.last_message.map(MessageDto::into_message);
        let conversation = Conversation {
            last_message_id: preview.as_ref().map(|m| m.id.clone()),
            last_activity_at: preview
                .as_ref()
                .map(|m| m.created_at)
                .unwrap_or(self.created_at),
            id: self.id,
            kind: self.kind,
            name: self.name,
            created_at: self.created_at,
        };
        (conversation, preview)
    }
}
