use crate::actions::ChatAction;
use crate::error::ChatError;
use crate::state::{ChatState, ConversationKind, Message, Reaction};
use crate::transport::{AiExchange, ConversationDto, GuestSendOutcome, MessageDto, MessagePage};

/// Pushed to the registered observer after every state transition, revs
/// strictly increasing. `LoginRequired` is the out-of-band signal the UI
/// answers by presenting login; the matching snapshot carries the flag too.
#[derive(Clone, Debug)]
pub enum ChatUpdate {
    FullState(ChatState),
    LoginRequired { rev: u64 },
}

impl ChatUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            ChatUpdate::FullState(s) => s.rev,
            ChatUpdate::LoginRequired { rev } => *rev,
        }
    }
}

/// Everything the core actor consumes, in one queue: user commands and the
/// results of its own spawned effects.
#[derive(Debug)]
pub(crate) enum CoreMsg {
    Action(ChatAction),
    /// `epoch` stamps the identity generation the effect was spawned under;
    /// results from before a logout are dropped unseen.
    Event { epoch: u64, event: Box<ChatEvent> },
}

/// Terminal result of one spawned effect. Each carries whatever pre-command
/// values its rollback needs, captured at dispatch time.
#[derive(Debug)]
pub(crate) enum ChatEvent {
    ConversationsLoaded {
        result: Result<Vec<ConversationDto>, ChatError>,
    },
    ConversationStarted {
        kind: ConversationKind,
        result: Result<ConversationDto, ChatError>,
    },
    MessagesLoaded {
        conversation_id: String,
        requested: u32,
        result: Result<MessagePage, ChatError>,
    },
    MessageSendCompleted {
        conversation_id: String,
        temp_id: String,
        result: Result<MessageDto, ChatError>,
    },
    AiSendCompleted {
        conversation_id: String,
        temp_id: String,
        result: Result<AiExchange, ChatError>,
    },
    GuestSendCompleted {
        temp_id: String,
        /// Conversation the optimistic message lives in locally; may be a
        /// synthesized draft id the delivered reply re-keys.
        local_conversation_id: String,
        result: Result<GuestSendOutcome, ChatError>,
    },
    MessageEdited {
        message_id: String,
        previous_content: String,
        result: Result<MessageDto, ChatError>,
    },
    MessageDeleted {
        removed: Message,
        result: Result<(), ChatError>,
    },
    ReactionUpdated {
        message_id: String,
        previous: Vec<Reaction>,
        result: Result<(), ChatError>,
    },
    MessageReported {
        message_id: String,
        result: Result<(), ChatError>,
    },
    GuestAssociated {
        guest_session_id: String,
        result: Result<(), ChatError>,
    },
}
