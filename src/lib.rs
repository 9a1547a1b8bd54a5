mod actions;
mod core;
mod error;
mod identity;
mod ledger;
mod logging;
mod reducer;
mod state;
mod store;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};
use tokio::sync::oneshot;
use uuid::Uuid;

pub use actions::ChatAction;
pub use error::{classify_http_status, ChatError, ErrorKind};
pub use identity::{FileGuestSessionStore, GuestSessionStore, SessionIdentity, ANONYMOUS_SENDER};
pub use ledger::{ConversationLoadState, ListLoadState, LoadLedger};
pub use state::*;
pub use store::{ConversationStore, MessageStore};
pub use transport::*;
pub use updates::ChatUpdate;

pub use crate::core::DEFAULT_PAGE_SIZE;

use crate::updates::CoreMsg;

/// Callback surface the UI registers to receive state updates.
pub trait ChatObserver: Send + Sync + 'static {
    fn on_update(&self, update: ChatUpdate);
}

/// Handle to the chat core. Owns the actor thread; all methods are safe to
/// call from any thread and none of them block on the network.
pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<ChatUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<ChatState>>,
    temp_seq: AtomicU64,
}

impl ChatApp {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        guest_store: Arc<dyn GuestSessionStore>,
        data_dir: impl Into<String>,
    ) -> Arc<Self> {
        let data_dir = data_dir.into();
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "ChatApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(ChatState::empty()));

        // Actor loop thread (single threaded "chat actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::ChatCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                transport,
                guest_store,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            temp_seq: AtomicU64::new(0),
        })
    }

    /// Current state snapshot, immediately available and fully formed.
    pub fn state(&self) -> ChatState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: ChatAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, observer: Box<dyn ChatObserver>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                observer.on_update(update);
            }
        });
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations_by_activity()
    }

    pub fn selected_conversation(&self) -> Option<Conversation> {
        self.state().selected_conversation()
    }

    pub fn messages_for(&self, conversation_id: &str) -> Vec<Message> {
        self.state().messages_for(conversation_id)
    }

    pub fn is_sending(&self, temp_id: &str) -> bool {
        self.state().is_sending(temp_id)
    }

    pub fn anonymous_guest_id(&self) -> Option<String> {
        self.state().identity.guest_session_id
    }

    /// Optimistically send into a conversation. Returns the message's temp id
    /// right away; delivery resolves through state updates.
    pub fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        media_url: Option<String>,
        gif_url: Option<String>,
    ) -> Result<String, ChatError> {
        if content.trim().is_empty() && media_url.is_none() && gif_url.is_none() {
            return Err(ChatError::new(ErrorKind::Validation, "message is empty"));
        }
        let temp_id = self.next_temp_id();
        self.dispatch(ChatAction::SendMessage {
            conversation_id: conversation_id.to_string(),
            temp_id: temp_id.clone(),
            content: content.to_string(),
            media_url,
            gif_url,
        });
        Ok(temp_id)
    }

    /// Authenticated send to the AI assistant. Callers resolve the
    /// conversation id first via [`ChatApp::ensure_ai_conversation_active`].
    pub fn send_ai_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<String, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::new(ErrorKind::Validation, "message is empty"));
        }
        let temp_id = self.next_temp_id();
        self.dispatch(ChatAction::SendAiMessage {
            conversation_id: conversation_id.to_string(),
            temp_id: temp_id.clone(),
            content: content.to_string(),
        });
        Ok(temp_id)
    }

    /// Anonymous send to the AI assistant. No conversation id is needed; the
    /// core reuses or synthesizes one.
    pub fn send_as_guest(&self, content: &str) -> Result<String, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::new(ErrorKind::Validation, "message is empty"));
        }
        let temp_id = self.next_temp_id();
        self.dispatch(ChatAction::SendGuestAiMessage {
            temp_id: temp_id.clone(),
            content: content.to_string(),
        });
        Ok(temp_id)
    }

    /// Resolve the AI conversation id, creating the conversation when absent
    /// and reusing it otherwise. Concurrent calls join one in-flight creation
    /// and resolve to the same id.
    pub async fn ensure_ai_conversation_active(&self) -> Result<String, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(ChatAction::EnsureAiConversation { reply });
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ChatError::new(ErrorKind::Internal, "core unavailable")),
        }
    }

    /// Fetch a conversation's first history page unless it is already loaded
    /// or loading. The snapshot check here is advisory; the actor sets the
    /// loading flag synchronously at dispatch, so racing callers collapse to
    /// a single fetch.
    pub fn load_messages_if_not_loaded(&self, conversation_id: &str) {
        let slot = self.state().ledger.conversation(conversation_id);
        if slot.loaded_once || slot.is_loading_messages {
            return;
        }
        self.dispatch(ChatAction::LoadMessages {
            conversation_id: conversation_id.to_string(),
            before_message_id: None,
            limit: None,
        });
    }

    pub fn load_conversations(&self) {
        self.dispatch(ChatAction::LoadConversations);
    }

    pub fn select_conversation(&self, conversation_id: Option<String>) {
        self.dispatch(ChatAction::SelectConversation { conversation_id });
    }

    /// Session-unique temp id: monotonic counter plus a random tail.
    fn next_temp_id(&self) -> String {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        format!("{TEMP_MESSAGE_PREFIX}{seq}-{}", Uuid::new_v4().simple())
    }
}
