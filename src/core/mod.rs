//! The core actor. One logical thread of control consumes the unified
//! action/event queue, owns the authoritative [`ChatState`], spawns transport
//! effects on its own tokio runtime, and publishes a full snapshot after
//! every transition.

mod config;

pub use config::DEFAULT_PAGE_SIZE;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use flume::Sender;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::ChatAction;
use crate::error::{ChatError, ErrorKind};
use crate::identity::GuestSessionStore;
use crate::reducer;
use crate::state::{
    is_temp_id, now_millis, ChatState, Conversation, ConversationKind, Message, MessageStatus,
    AI_CONVERSATION_NAME, TEMP_CONVERSATION_PREFIX,
};
use crate::transport::{ChatTransport, GuestSendOutcome, OutgoingMessage};
use crate::updates::{ChatEvent, ChatUpdate, CoreMsg};

pub(crate) struct ChatCore {
    state: ChatState,
    rev: u64,
    /// Identity generation. Bumped on logout; results stamped with an older
    /// epoch are dropped unseen.
    epoch: u64,
    last_outgoing_ts: i64,
    update_sender: Sender<ChatUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<ChatState>>,
    config: config::CoreConfig,
    runtime: tokio::runtime::Runtime,
    transport: Arc<dyn ChatTransport>,
    guest_store: Arc<dyn GuestSessionStore>,
    /// Temp ids with a send effect currently in flight. A message in here is
    /// not retryable or deletable until its terminal event lands.
    pending_sends: HashSet<String>,
    /// A list refresh was requested while one was in flight; run another when
    /// the current one completes.
    list_load_dirty: bool,
    ai_start_in_flight: bool,
    ai_start_waiters: Vec<oneshot::Sender<Result<String, ChatError>>>,
    /// Retries whose AIBot conversation is still a draft, parked until the
    /// in-flight create lands.
    ai_sends_after_start: Vec<String>,
}

impl ChatCore {
    pub(crate) fn new(
        update_sender: Sender<ChatUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<ChatState>>,
        transport: Arc<dyn ChatTransport>,
        guest_store: Arc<dyn GuestSessionStore>,
    ) -> Self {
        let config = config::load_core_config(&data_dir);

        let mut state = ChatState::empty();
        state.identity.guest_session_id = guest_store.get();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state,
            rev: 0,
            epoch: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            transport,
            guest_store,
            pending_sends: HashSet::new(),
            list_load_dirty: false,
            ai_start_in_flight: false,
            ai_start_waiters: Vec::new(),
            ai_sends_after_start: Vec::new(),
        };

        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &ChatState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(ChatUpdate::FullState(snapshot));
    }

    /// An anonymous send was refused pending login. The snapshot carries the
    /// flag; the discrete update is the cue to present login.
    fn emit_login_required(&mut self) {
        self.state.login_required = true;
        self.emit_state();
        // Keep snapshot rev in sync with the update stream even though this
        // is a side-channel update.
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(ChatUpdate::LoginRequired { rev });
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.state.notice = Some(text.into());
        self.emit_state();
    }

    /// Timestamps for outgoing messages are strictly increasing even when the
    /// wall clock stalls or steps backwards, so optimistic ordering is stable.
    fn next_outgoing_ts(&mut self) -> i64 {
        let ts = now_millis().max(self.last_outgoing_ts + 1);
        self.last_outgoing_ts = ts;
        ts
    }

    pub(crate) fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log the payload: message content stays out of logs.
                info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Event { epoch, event } => {
                if epoch != self.epoch {
                    debug!(stale = epoch, current = self.epoch, "dropping event from an earlier session");
                    return;
                }
                self.handle_event(*event);
            }
        }
    }

    fn handle_action(&mut self, action: ChatAction) {
        match action {
            ChatAction::LoadConversations => self.load_conversations(),
            ChatAction::StartConversation {
                kind,
                target_user_id,
                seed_content,
            } => self.start_conversation(kind, target_user_id, seed_content),
            ChatAction::EnsureAiConversation { reply } => self.ensure_ai_conversation(reply),
            ChatAction::SelectConversation { conversation_id } => {
                self.state.selected_conversation_id = conversation_id;
                self.emit_state();
            }
            ChatAction::LoadMessages {
                conversation_id,
                before_message_id,
                limit,
            } => self.load_messages(conversation_id, before_message_id, limit),
            ChatAction::SendMessage {
                conversation_id,
                temp_id,
                content,
                media_url,
                gif_url,
            } => self.send_message(conversation_id, temp_id, content, media_url, gif_url),
            ChatAction::SendAiMessage {
                conversation_id,
                temp_id,
                content,
            } => self.send_ai_message(conversation_id, temp_id, content),
            ChatAction::SendGuestAiMessage { temp_id, content } => {
                self.send_guest_ai_message(temp_id, content)
            }
            ChatAction::RetryMessage { message_id } => self.retry_message(message_id),
            ChatAction::DiscardFailedMessage { message_id } => {
                self.discard_failed_message(&message_id)
            }
            ChatAction::EditMessage {
                message_id,
                content,
            } => self.edit_message(message_id, content),
            ChatAction::DeleteMessage { message_id } => self.delete_message(message_id),
            ChatAction::ReactToMessage { message_id, emoji } => {
                self.react_to_message(message_id, emoji)
            }
            ChatAction::ReportMessage { message_id, reason } => {
                self.report_message(message_id, reason)
            }
            ChatAction::UserAuthenticated { user_id } => self.user_authenticated(user_id),
            ChatAction::UserLoggedOut => self.user_logged_out(),
            ChatAction::ClearNotice => {
                if self.state.notice.is_some() {
                    self.state.notice = None;
                    self.emit_state();
                }
            }
        }
    }

    fn load_conversations(&mut self) {
        if !self.state.ledger.begin_list_load() {
            // One refresh in flight is enough; remember to run another after.
            self.list_load_dirty = true;
            return;
        }
        self.emit_state();

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.list_conversations().await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::ConversationsLoaded { result }),
            });
        });
    }

    fn start_conversation(
        &mut self,
        kind: ConversationKind,
        target_user_id: Option<String>,
        seed_content: Option<String>,
    ) {
        if kind == ConversationKind::AiBot {
            let confirmed = self
                .state
                .ai_conversation()
                .filter(|c| !is_temp_id(&c.id))
                .map(|c| c.id.clone());
            if let Some(id) = confirmed {
                // There is exactly one AIBot conversation; starting it again
                // just selects it.
                self.state.selected_conversation_id = Some(id);
                self.emit_state();
                return;
            }
            if self.ai_start_in_flight {
                return;
            }
            self.ai_start_in_flight = true;
        }

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let event_kind = kind.clone();
        self.runtime.spawn(async move {
            let result = transport
                .start_conversation(kind, target_user_id.as_deref(), seed_content.as_deref())
                .await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::ConversationStarted {
                    kind: event_kind,
                    result,
                }),
            });
        });
    }

    fn ensure_ai_conversation(&mut self, reply: oneshot::Sender<Result<String, ChatError>>) {
        let confirmed = self
            .state
            .ai_conversation()
            .filter(|c| !is_temp_id(&c.id))
            .map(|c| c.id.clone());
        if let Some(id) = confirmed {
            self.state.selected_conversation_id = Some(id.clone());
            self.emit_state();
            let _ = reply.send(Ok(id));
            return;
        }

        // Join the in-flight creation rather than racing it.
        self.ai_start_waiters.push(reply);
        self.request_ai_start();
    }

    /// Kick off the AIBot conversation create unless one is already in
    /// flight. Everyone who needs the conversation joins the same request;
    /// completion lands as a `ConversationStarted` event.
    fn request_ai_start(&mut self) {
        if self.ai_start_in_flight {
            return;
        }
        self.ai_start_in_flight = true;

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport
                .start_conversation(ConversationKind::AiBot, None, None)
                .await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::ConversationStarted {
                    kind: ConversationKind::AiBot,
                    result,
                }),
            });
        });
    }

    fn load_messages(
        &mut self,
        conversation_id: String,
        before_message_id: Option<String>,
        limit: Option<u32>,
    ) {
        if is_temp_id(&conversation_id) {
            // Nothing to fetch for a conversation the service has never seen.
            debug!(%conversation_id, "skipping history load for a draft conversation");
            return;
        }
        if !self.state.ledger.begin_messages_load(&conversation_id) {
            debug!(%conversation_id, "history load already in flight");
            return;
        }
        self.emit_state();

        let requested = self.config.page_limit(limit);
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport
                .get_messages(&conversation_id, before_message_id.as_deref(), requested)
                .await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::MessagesLoaded {
                    conversation_id,
                    requested,
                    result,
                }),
            });
        });
    }

    fn build_optimistic(
        &mut self,
        temp_id: &str,
        conversation_id: &str,
        content: &str,
        media_url: Option<String>,
        gif_url: Option<String>,
    ) -> Message {
        let sender_id = self.state.identity.effective_sender_id().to_string();
        let created_at = self.next_outgoing_ts();
        Message {
            id: temp_id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id,
            content: content.to_string(),
            created_at,
            status: MessageStatus::Sending,
            error: None,
            reactions: vec![],
            media_url,
            gif_url,
        }
    }

    /// The send effects below are shared between first dispatch and retry;
    /// each registers the temp id as in flight and reports back through the
    /// matching completion event.
    fn spawn_direct_send(
        &mut self,
        conversation_id: String,
        temp_id: String,
        outgoing: OutgoingMessage,
    ) {
        self.pending_sends.insert(temp_id.clone());
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.send_message(&conversation_id, &outgoing).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::MessageSendCompleted {
                    conversation_id,
                    temp_id,
                    result,
                }),
            });
        });
    }

    fn spawn_ai_send(&mut self, conversation_id: String, temp_id: String, content: String) {
        self.pending_sends.insert(temp_id.clone());
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.send_ai_message(&conversation_id, &content).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::AiSendCompleted {
                    conversation_id,
                    temp_id,
                    result,
                }),
            });
        });
    }

    fn spawn_guest_send(&mut self, local_conversation_id: String, temp_id: String, content: String) {
        self.pending_sends.insert(temp_id.clone());
        let guest_session_id = self.state.identity.guest_session_id.clone();
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport
                .send_guest_ai_message(&content, guest_session_id.as_deref())
                .await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::GuestSendCompleted {
                    temp_id,
                    local_conversation_id,
                    result,
                }),
            });
        });
    }

    fn send_message(
        &mut self,
        conversation_id: String,
        temp_id: String,
        content: String,
        media_url: Option<String>,
        gif_url: Option<String>,
    ) {
        let content = content.trim().to_string();
        if content.is_empty() && media_url.is_none() && gif_url.is_none() {
            debug!("dropping empty send");
            return;
        }

        let message = self.build_optimistic(
            &temp_id,
            &conversation_id,
            &content,
            media_url.clone(),
            gif_url.clone(),
        );
        reducer::insert_optimistic(&mut self.state, message);
        self.emit_state();

        let outgoing = OutgoingMessage {
            content,
            media_url,
            gif_url,
        };
        self.spawn_direct_send(conversation_id, temp_id, outgoing);
    }

    fn send_ai_message(&mut self, conversation_id: String, temp_id: String, content: String) {
        let content = content.trim().to_string();
        if content.is_empty() {
            debug!("dropping empty send");
            return;
        }

        let message = self.build_optimistic(&temp_id, &conversation_id, &content, None, None);
        reducer::insert_optimistic(&mut self.state, message);
        self.emit_state();

        self.spawn_ai_send(conversation_id, temp_id, content);
    }

    fn send_guest_ai_message(&mut self, temp_id: String, content: String) {
        let content = content.trim().to_string();
        if content.is_empty() {
            debug!("dropping empty send");
            return;
        }

        // Render into the AIBot conversation if one exists locally, or
        // synthesize a draft that the delivered reply will re-key.
        let existing = self.state.ai_conversation().map(|c| c.id.clone());
        let conversation_id = match existing {
            Some(id) => id,
            None => {
                let id = format!("{TEMP_CONVERSATION_PREFIX}{}", Uuid::new_v4().simple());
                let ts = now_millis();
                self.state.conversations.upsert(Conversation {
                    id: id.clone(),
                    kind: ConversationKind::AiBot,
                    name: AI_CONVERSATION_NAME.to_string(),
                    created_at: ts,
                    last_message_id: None,
                    last_activity_at: ts,
                });
                id
            }
        };

        let message = self.build_optimistic(&temp_id, &conversation_id, &content, None, None);
        reducer::insert_optimistic(&mut self.state, message);
        self.state.selected_conversation_id = Some(conversation_id.clone());
        self.emit_state();

        self.spawn_guest_send(conversation_id, temp_id, content);
    }

    /// Re-dispatch an unconfirmed message: a `Failed` send, or one left
    /// `Sending` by a login-required refusal. Routed by what the conversation
    /// and identity are NOW, not what they were at first dispatch.
    fn retry_message(&mut self, message_id: String) {
        let Some(message) = self.state.messages.get(&message_id).cloned() else {
            debug!(%message_id, "retry for an unknown message");
            return;
        };
        if !message.is_temp() || message.status == MessageStatus::Sent {
            debug!(%message_id, "retry ignored, message is already confirmed");
            return;
        }
        if self.pending_sends.contains(&message_id) {
            debug!(%message_id, "retry ignored, send still in flight");
            return;
        }

        let kind = self
            .state
            .conversations
            .get(&message.conversation_id)
            .map(|c| c.kind.clone());
        let Some(kind) = kind else {
            reducer::apply_send_failure(
                &mut self.state,
                &message_id,
                ChatError::new(ErrorKind::Internal, "conversation no longer exists"),
            );
            self.emit_state();
            return;
        };

        reducer::mark_sending(&mut self.state, &message_id);
        self.emit_state();

        let temp_id = message_id;
        let conversation_id = message.conversation_id.clone();

        match kind {
            ConversationKind::Direct => {
                let outgoing = OutgoingMessage {
                    content: message.content,
                    media_url: message.media_url,
                    gif_url: message.gif_url,
                };
                self.spawn_direct_send(conversation_id, temp_id, outgoing);
            }
            ConversationKind::AiBot if !self.state.identity.is_authenticated() => {
                self.spawn_guest_send(conversation_id, temp_id, message.content);
            }
            ConversationKind::AiBot if is_temp_id(&conversation_id) => {
                // Composed anonymously, retried after login: the AIBot
                // conversation has to exist server-side before the send. Park
                // behind the one in-flight create instead of racing it.
                self.pending_sends.insert(temp_id.clone());
                self.ai_sends_after_start.push(temp_id);
                self.request_ai_start();
            }
            ConversationKind::AiBot => {
                self.spawn_ai_send(conversation_id, temp_id, message.content);
            }
        }
    }

    /// Sends parked behind the conversation create go out now that it exists;
    /// adoption has already re-keyed their messages into it.
    fn flush_parked_ai_sends(&mut self, conversation_id: &str) {
        for temp_id in std::mem::take(&mut self.ai_sends_after_start) {
            match self.state.messages.get(&temp_id).map(|m| m.content.clone()) {
                Some(content) => self.spawn_ai_send(conversation_id.to_string(), temp_id, content),
                None => {
                    self.pending_sends.remove(&temp_id);
                }
            }
        }
    }

    fn discard_failed_message(&mut self, message_id: &str) {
        let status = self.state.messages.get(message_id).map(|m| m.status.clone());
        match status {
            Some(MessageStatus::Failed) => {
                if let Some(removed) = self.state.messages.remove(message_id) {
                    reducer::refresh_conversation_preview(&mut self.state, &removed.conversation_id);
                    self.emit_state();
                }
            }
            Some(_) => debug!(%message_id, "discard ignored, message is not failed"),
            None => {}
        }
    }

    fn edit_message(&mut self, message_id: String, content: String) {
        let content = content.trim().to_string();
        if content.is_empty() {
            debug!("dropping empty edit");
            return;
        }
        if is_temp_id(&message_id) {
            debug!(%message_id, "edit ignored for an unconfirmed message");
            return;
        }
        let Some(previous_content) =
            reducer::apply_optimistic_edit(&mut self.state, &message_id, &content)
        else {
            debug!(%message_id, "edit for an unknown message");
            return;
        };
        self.emit_state();

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.edit_message(&message_id, &content).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::MessageEdited {
                    message_id,
                    previous_content,
                    result,
                }),
            });
        });
    }

    fn delete_message(&mut self, message_id: String) {
        if is_temp_id(&message_id) {
            // Unconfirmed messages never reached the service; drop locally.
            if self.pending_sends.contains(&message_id) {
                debug!(%message_id, "delete ignored, send still in flight");
                return;
            }
            if reducer::apply_optimistic_delete(&mut self.state, &message_id).is_some() {
                self.emit_state();
            }
            return;
        }

        let Some(removed) = reducer::apply_optimistic_delete(&mut self.state, &message_id) else {
            debug!(%message_id, "delete for an unknown message");
            return;
        };
        self.emit_state();

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.delete_message(&removed.id).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::MessageDeleted { removed, result }),
            });
        });
    }

    fn react_to_message(&mut self, message_id: String, emoji: String) {
        if is_temp_id(&message_id) {
            debug!(%message_id, "reaction ignored for an unconfirmed message");
            return;
        }
        let Some((previous, active)) =
            reducer::apply_optimistic_reaction(&mut self.state, &message_id, &emoji)
        else {
            debug!(%message_id, "reaction for an unknown message");
            return;
        };
        self.emit_state();

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.react_to_message(&message_id, &emoji, active).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::ReactionUpdated {
                    message_id,
                    previous,
                    result,
                }),
            });
        });
    }

    fn report_message(&mut self, message_id: String, reason: String) {
        if is_temp_id(&message_id) {
            debug!(%message_id, "report ignored for an unconfirmed message");
            return;
        }

        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.report_message(&message_id, &reason).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::MessageReported { message_id, result }),
            });
        });
    }

    fn user_authenticated(&mut self, user_id: String) {
        info!("user_authenticated");
        self.state.identity.auth_user_id = Some(user_id);
        self.state.login_required = false;
        self.emit_state();

        if self.state.identity.guest_session_id.is_some() {
            // Guest history must be attached before the id is cleared; the
            // success event triggers the list reload.
            self.associate_guest_history();
        } else {
            self.load_conversations();
        }
    }

    fn associate_guest_history(&mut self) {
        let Some(guest_session_id) = self.state.identity.guest_session_id.clone() else {
            return;
        };
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = transport.associate_guest_session(&guest_session_id).await;
            let _ = tx.send(CoreMsg::Event {
                epoch,
                event: Box::new(ChatEvent::GuestAssociated {
                    guest_session_id,
                    result,
                }),
            });
        });
    }

    fn user_logged_out(&mut self) {
        info!("user_logged_out");
        self.epoch += 1;
        for waiter in self.ai_start_waiters.drain(..) {
            let _ = waiter.send(Err(ChatError::new(ErrorKind::Auth, "logged out")));
        }
        self.ai_start_in_flight = false;
        self.ai_sends_after_start.clear();
        self.list_load_dirty = false;
        self.pending_sends.clear();

        // An unassociated guest session survives logout; it belongs to the
        // device, not the account.
        let guest_session_id = self.state.identity.guest_session_id.clone();
        self.state = ChatState::empty();
        self.state.identity.guest_session_id = guest_session_id;
        self.emit_state();
    }

    fn handle_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ConversationsLoaded { result } => {
                match result {
                    Ok(conversations) => {
                        info!(count = conversations.len(), "conversations_loaded");
                        reducer::apply_conversations_loaded(&mut self.state, conversations);
                    }
                    Err(e) => {
                        warn!(err = %e, "conversations_load_failed");
                        reducer::fail_conversations_load(&mut self.state, e);
                    }
                }
                self.emit_state();
                if self.list_load_dirty {
                    self.list_load_dirty = false;
                    self.load_conversations();
                }
            }
            ChatEvent::ConversationStarted { kind, result } => {
                let is_ai = kind == ConversationKind::AiBot;
                if is_ai {
                    self.ai_start_in_flight = false;
                }
                match result {
                    Ok(dto) => {
                        info!(conversation_id = %dto.id, "conversation_started");
                        let id = reducer::apply_conversation_started(&mut self.state, dto);
                        self.state.selected_conversation_id = Some(id.clone());
                        self.emit_state();
                        if is_ai {
                            for waiter in self.ai_start_waiters.drain(..) {
                                let _ = waiter.send(Ok(id.clone()));
                            }
                            self.flush_parked_ai_sends(&id);
                        }
                    }
                    Err(e) => {
                        warn!(err = %e, "conversation_start_failed");
                        if is_ai {
                            for waiter in self.ai_start_waiters.drain(..) {
                                let _ = waiter.send(Err(e.clone()));
                            }
                            for temp_id in std::mem::take(&mut self.ai_sends_after_start) {
                                self.pending_sends.remove(&temp_id);
                                reducer::apply_send_failure(&mut self.state, &temp_id, e.clone());
                            }
                        }
                        self.notice(format!("Couldn't start the conversation: {}", e.message));
                    }
                }
            }
            ChatEvent::MessagesLoaded {
                conversation_id,
                requested,
                result,
            } => {
                match result {
                    Ok(page) => {
                        debug!(%conversation_id, fetched = page.messages.len(), "messages_loaded");
                        reducer::apply_messages_loaded(
                            &mut self.state,
                            &conversation_id,
                            requested,
                            page,
                        );
                    }
                    Err(e) => {
                        warn!(%conversation_id, err = %e, "messages_load_failed");
                        reducer::fail_messages_load(&mut self.state, &conversation_id, e);
                    }
                }
                self.emit_state();
            }
            ChatEvent::MessageSendCompleted {
                conversation_id,
                temp_id,
                result,
            } => {
                self.pending_sends.remove(&temp_id);
                match result {
                    Ok(dto) => {
                        info!(%conversation_id, %temp_id, confirmed_id = %dto.id, "message_sent");
                        reducer::apply_send_success(&mut self.state, &temp_id, vec![dto]);
                    }
                    Err(e) => {
                        warn!(%conversation_id, %temp_id, err = %e, "message_send_failed");
                        reducer::apply_send_failure(&mut self.state, &temp_id, e);
                    }
                }
                self.emit_state();
            }
            ChatEvent::AiSendCompleted {
                conversation_id,
                temp_id,
                result,
            } => {
                self.pending_sends.remove(&temp_id);
                match result {
                    Ok(exchange) => {
                        info!(%conversation_id, %temp_id, "ai_message_sent");
                        reducer::apply_send_success(
                            &mut self.state,
                            &temp_id,
                            vec![exchange.user_message, exchange.bot_reply],
                        );
                    }
                    Err(e) => {
                        warn!(%conversation_id, %temp_id, err = %e, "ai_message_send_failed");
                        reducer::apply_send_failure(&mut self.state, &temp_id, e);
                    }
                }
                self.emit_state();
            }
            ChatEvent::GuestSendCompleted {
                temp_id,
                local_conversation_id,
                result,
            } => {
                self.pending_sends.remove(&temp_id);
                match result {
                    Ok(GuestSendOutcome::Delivered {
                        user_message,
                        ai_reply,
                        guest_session_id,
                    }) => {
                        info!(%temp_id, "guest_message_delivered");
                        reducer::apply_guest_delivered(
                            &mut self.state,
                            &local_conversation_id,
                            &temp_id,
                            user_message,
                            ai_reply,
                            &guest_session_id,
                        );
                        self.guest_store.set(&guest_session_id);
                        self.emit_state();
                        // A login raced the send: fold the fresh guest
                        // history into the account right away.
                        if self.state.identity.is_authenticated() {
                            self.associate_guest_history();
                        }
                    }
                    Ok(GuestSendOutcome::LoginRequired) => {
                        info!(%temp_id, "guest_send_login_required");
                        if self.state.identity.is_authenticated() {
                            // The refusal predates the login that just
                            // happened; the send is theirs to retry now.
                            reducer::apply_send_failure(
                                &mut self.state,
                                &temp_id,
                                ChatError::new(ErrorKind::Auth, "login required"),
                            );
                            self.emit_state();
                        } else {
                            self.emit_login_required();
                        }
                    }
                    Err(e) => {
                        warn!(%temp_id, err = %e, "guest_send_failed");
                        reducer::apply_send_failure(&mut self.state, &temp_id, e);
                        self.emit_state();
                    }
                }
            }
            ChatEvent::MessageEdited {
                message_id,
                previous_content,
                result,
            } => {
                match result {
                    Ok(dto) => {
                        debug!(%message_id, "message_edited");
                        self.state.messages.upsert(dto.into_message());
                    }
                    Err(e) => {
                        warn!(%message_id, err = %e, "message_edit_failed");
                        reducer::rollback_edit(&mut self.state, &message_id, previous_content, e);
                    }
                }
                self.emit_state();
            }
            ChatEvent::MessageDeleted { removed, result } => match result {
                Ok(()) => debug!(message_id = %removed.id, "message_deleted"),
                Err(e) => {
                    warn!(message_id = %removed.id, err = %e, "message_delete_failed");
                    reducer::rollback_delete(&mut self.state, removed, e);
                    self.emit_state();
                }
            },
            ChatEvent::ReactionUpdated {
                message_id,
                previous,
                result,
            } => match result {
                Ok(()) => debug!(%message_id, "reaction_updated"),
                Err(e) => {
                    warn!(%message_id, err = %e, "reaction_update_failed");
                    reducer::rollback_reaction(&mut self.state, &message_id, previous, e);
                    self.emit_state();
                }
            },
            ChatEvent::MessageReported { message_id, result } => match result {
                Ok(()) => info!(%message_id, "message_reported"),
                Err(e) => {
                    warn!(%message_id, err = %e, "message_report_failed");
                    reducer::record_message_error(&mut self.state, &message_id, e);
                    self.emit_state();
                }
            },
            ChatEvent::GuestAssociated {
                guest_session_id,
                result,
            } => match result {
                Ok(()) => {
                    info!("guest_history_associated");
                    if self.state.identity.guest_session_id.as_deref()
                        == Some(guest_session_id.as_str())
                    {
                        self.state.identity.guest_session_id = None;
                        self.guest_store.remove();
                    }
                    self.emit_state();
                    self.load_conversations();
                }
                Err(e) => {
                    warn!(err = %e, "guest_association_failed");
                    // The guest id stays for a later attempt; login itself is
                    // unaffected and the account's conversations still load.
                    self.notice("We couldn't attach your earlier AI chat to this account yet.");
                    self.load_conversations();
                }
            },
        }
    }
}
