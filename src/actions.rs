use tokio::sync::oneshot;

use crate::error::ChatError;
use crate::state::ConversationKind;

#[derive(Debug)]
pub enum ChatAction {
    // Conversations
    LoadConversations,
    StartConversation {
        kind: ConversationKind,
        target_user_id: Option<String>,
        seed_content: Option<String>,
    },
    /// Resolve the AIBot conversation, creating it when absent. Concurrent
    /// requests join the same in-flight creation and get the same id.
    EnsureAiConversation {
        reply: oneshot::Sender<Result<String, ChatError>>,
    },
    SelectConversation {
        conversation_id: Option<String>,
    },

    // Message history
    LoadMessages {
        conversation_id: String,
        before_message_id: Option<String>,
        limit: Option<u32>,
    },

    // Sending
    SendMessage {
        conversation_id: String,
        temp_id: String,
        content: String,
        media_url: Option<String>,
        gif_url: Option<String>,
    },
    SendAiMessage {
        conversation_id: String,
        temp_id: String,
        content: String,
    },
    SendGuestAiMessage {
        temp_id: String,
        content: String,
    },
    RetryMessage {
        message_id: String,
    },
    DiscardFailedMessage {
        message_id: String,
    },

    // Mutating existing messages
    EditMessage {
        message_id: String,
        content: String,
    },
    DeleteMessage {
        message_id: String,
    },
    ReactToMessage {
        message_id: String,
        emoji: String,
    },
    ReportMessage {
        message_id: String,
        reason: String,
    },

    // Identity
    UserAuthenticated {
        user_id: String,
    },
    UserLoggedOut,

    // UI
    ClearNotice,
}

impl ChatAction {
    /// Log-safe action tag (message content never appears in logs).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversations
            ChatAction::LoadConversations => "LoadConversations",
            ChatAction::StartConversation { .. } => "StartConversation",
            ChatAction::EnsureAiConversation { .. } => "EnsureAiConversation",
            ChatAction::SelectConversation { .. } => "SelectConversation",

            // Message history
            ChatAction::LoadMessages { .. } => "LoadMessages",

            // Sending
            ChatAction::SendMessage { .. } => "SendMessage",
            ChatAction::SendAiMessage { .. } => "SendAiMessage",
            ChatAction::SendGuestAiMessage { .. } => "SendGuestAiMessage",
            ChatAction::RetryMessage { .. } => "RetryMessage",
            ChatAction::DiscardFailedMessage { .. } => "DiscardFailedMessage",

            // Mutating existing messages
            ChatAction::EditMessage { .. } => "EditMessage",
            ChatAction::DeleteMessage { .. } => "DeleteMessage",
            ChatAction::ReactToMessage { .. } => "ReactToMessage",
            ChatAction::ReportMessage { .. } => "ReportMessage",

            // Identity
            ChatAction::UserAuthenticated { .. } => "UserAuthenticated",
            ChatAction::UserLoggedOut => "UserLoggedOut",

            // UI
            ChatAction::ClearNotice => "ClearNotice",
        }
    }
}
