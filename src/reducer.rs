//! Pure state transitions applied by the core actor. No I/O, no channels,
//! no clock reads: everything a merge or rollback needs arrives as an
//! argument, so every rule here is unit-testable without the send pipeline.

use crate::error::ChatError;
use crate::state::{
    is_temp_id, ChatState, Conversation, ConversationKind, Message, MessageStatus, Reaction,
    AI_CONVERSATION_NAME,
};
use crate::transport::{ConversationDto, MessageDto, MessagePage};

/// Recompute a conversation's preview pointer and activity time from the
/// messages currently in the store.
pub(crate) fn refresh_conversation_preview(state: &mut ChatState, conversation_id: &str) {
    let newest = state
        .messages
        .iter()
        .filter(|m| m.conversation_id == conversation_id)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
        .map(|m| (m.id.clone(), m.created_at));
    if let Some(conversation) = state.conversations.get_mut(conversation_id) {
        match newest {
            Some((id, at)) => {
                conversation.last_message_id = Some(id);
                conversation.last_activity_at = at;
            }
            None => {
                conversation.last_message_id = None;
                conversation.last_activity_at = conversation.created_at;
            }
        }
    }
}

/// Insert an optimistic message and bump its conversation's preview.
pub(crate) fn insert_optimistic(state: &mut ChatState, message: Message) {
    let conversation_id = message.conversation_id.clone();
    state.messages.upsert(message);
    refresh_conversation_preview(state, &conversation_id);
}

/// Fresh list load: server state wins wholesale. The only survivors are
/// locally synthesized draft conversations that still hold messages the
/// service has never seen.
pub(crate) fn apply_conversations_loaded(state: &mut ChatState, conversations: Vec<ConversationDto>) {
    let messages = &state.messages;
    state
        .conversations
        .retain(|c| is_temp_id(&c.id) && messages.iter().any(|m| m.conversation_id == c.id));

    for dto in conversations {
        let (conversation, preview) = dto.into_parts();
        if let Some(message) = preview {
            state.messages.upsert(message);
        }
        state.conversations.upsert(conversation);
    }

    // Confirmed messages of conversations the service stopped listing are
    // stale cache; unconfirmed ones are user content and stay put.
    let conversations = &state.conversations;
    state
        .messages
        .retain(|m| conversations.contains(&m.conversation_id) || m.status != MessageStatus::Sent);
    state.ledger.retain(|id| conversations.contains(id));
    state.ledger.complete_list_load();
}

pub(crate) fn fail_conversations_load(state: &mut ChatState, error: ChatError) {
    state.ledger.fail_list_load(error);
}

/// A conversation came back from a start request. For AIBot conversations any
/// local draft is folded into the confirmed one first, so the one-AIBot
/// invariant holds. Returns the confirmed id.
pub(crate) fn apply_conversation_started(state: &mut ChatState, dto: ConversationDto) -> String {
    let (conversation, preview) = dto.into_parts();
    let id = conversation.id.clone();
    if conversation.kind == ConversationKind::AiBot {
        let draft = state
            .conversations
            .iter()
            .find(|c| c.kind == ConversationKind::AiBot && is_temp_id(&c.id))
            .map(|c| c.id.clone());
        if let Some(local_id) = draft {
            adopt_conversation(state, &local_id, &id, conversation.created_at);
        }
    }
    if let Some(message) = preview {
        state.messages.upsert(message);
    }
    state.conversations.upsert(conversation);
    refresh_conversation_preview(state, &id);
    id
}

/// Merge one fetched page. Existing messages are never removed by a load;
/// the end of history is either stated by the page or inferred from a
/// short one.
pub(crate) fn apply_messages_loaded(
    state: &mut ChatState,
    conversation_id: &str,
    requested: u32,
    page: MessagePage,
) {
    let fetched = page.messages.len();
    let all_loaded = match page.has_more {
        Some(has_more) => !has_more,
        None => fetched < requested as usize,
    };
    state.messages.upsert_many(
        page.messages
            .into_iter()
            .map(MessageDto::into_message)
            .collect(),
    );
    state
        .ledger
        .complete_messages_load(conversation_id, all_loaded);
    refresh_conversation_preview(state, conversation_id);
}

pub(crate) fn fail_messages_load(state: &mut ChatState, conversation_id: &str, error: ChatError) {
    state.ledger.fail_messages_load(conversation_id, error);
}

/// Swap the optimistic message for its confirmed replacement(s) and refresh
/// the parent conversation's preview.
pub(crate) fn apply_send_success(state: &mut ChatState, temp_id: &str, confirmed: Vec<MessageDto>) {
    let confirmed: Vec<Message> = confirmed.into_iter().map(MessageDto::into_message).collect();
    let conversation_id = confirmed.first().map(|m| m.conversation_id.clone());
    state.messages.remove_then_upsert(temp_id, confirmed);
    if let Some(id) = conversation_id {
        refresh_conversation_preview(state, &id);
    }
}

/// The optimistic message stays where it is, flipped to `Failed` with the
/// error attached. Removal or retry is the user's call.
pub(crate) fn apply_send_failure(state: &mut ChatState, temp_id: &str, error: ChatError) {
    if let Some(message) = state.messages.get_mut(temp_id) {
        message.status = MessageStatus::Failed;
        message.error = Some(error);
    }
}

/// Put a failed message back on the wire-pending track.
pub(crate) fn mark_sending(state: &mut ChatState, message_id: &str) {
    if let Some(message) = state.messages.get_mut(message_id) {
        message.status = MessageStatus::Sending;
        message.error = None;
    }
}

/// A delivered anonymous exchange: adopt the server's conversation identity,
/// swap the optimistic message for echo + reply, record the guest session id.
pub(crate) fn apply_guest_delivered(
    state: &mut ChatState,
    local_conversation_id: &str,
    temp_id: &str,
    user_message: MessageDto,
    ai_reply: MessageDto,
    guest_session_id: &str,
) {
    let server_id = user_message.conversation_id.clone();
    adopt_conversation(state, local_conversation_id, &server_id, user_message.created_at);
    apply_send_success(state, temp_id, vec![user_message, ai_reply]);
    state.identity.guest_session_id = Some(guest_session_id.to_string());
}

/// Make `server_id` the one true identity of a conversation that may so far
/// only exist as a local draft. Synthesizes a minimal AIBot conversation when
/// the reply names an id nothing local knows about.
pub(crate) fn adopt_conversation(
    state: &mut ChatState,
    local_id: &str,
    server_id: &str,
    seen_at: i64,
) {
    if !state.conversations.contains(server_id) {
        state.conversations.upsert(Conversation {
            id: server_id.to_string(),
            kind: ConversationKind::AiBot,
            name: AI_CONVERSATION_NAME.to_string(),
            created_at: seen_at,
            last_message_id: None,
            last_activity_at: seen_at,
        });
    }
    if local_id == server_id {
        return;
    }
    state.messages.rekey_conversation(local_id, server_id);
    state.ledger.rekey(local_id, server_id);
    state.conversations.remove(local_id);
    if state.selected_conversation_id.as_deref() == Some(local_id) {
        state.selected_conversation_id = Some(server_id.to_string());
    }
}

/// Optimistic edit; returns the pre-edit content for the rollback path, or
/// `None` when the message is gone (in which case nothing was changed).
pub(crate) fn apply_optimistic_edit(
    state: &mut ChatState,
    message_id: &str,
    content: &str,
) -> Option<String> {
    let message = state.messages.get_mut(message_id)?;
    Some(std::mem::replace(&mut message.content, content.to_string()))
}

pub(crate) fn rollback_edit(
    state: &mut ChatState,
    message_id: &str,
    previous: String,
    error: ChatError,
) {
    if let Some(message) = state.messages.get_mut(message_id) {
        message.content = previous;
        message.error = Some(error);
    }
}

/// Optimistic delete; returns the removed entity so a failure can restore it
/// exactly as it was.
pub(crate) fn apply_optimistic_delete(state: &mut ChatState, message_id: &str) -> Option<Message> {
    let removed = state.messages.remove(message_id)?;
    let conversation_id = removed.conversation_id.clone();
    refresh_conversation_preview(state, &conversation_id);
    Some(removed)
}

pub(crate) fn rollback_delete(state: &mut ChatState, mut removed: Message, error: ChatError) {
    removed.error = Some(error);
    let conversation_id = removed.conversation_id.clone();
    state.messages.upsert(removed);
    refresh_conversation_preview(state, &conversation_id);
}

/// Optimistic reaction toggle; returns the pre-toggle reaction set and
/// whether the reaction is now active (what the service should be told).
pub(crate) fn apply_optimistic_reaction(
    state: &mut ChatState,
    message_id: &str,
    emoji: &str,
) -> Option<(Vec<Reaction>, bool)> {
    let message = state.messages.get_mut(message_id)?;
    let previous = message.reactions.clone();
    let active = toggle_reaction(&mut message.reactions, emoji);
    Some((previous, active))
}

pub(crate) fn rollback_reaction(
    state: &mut ChatState,
    message_id: &str,
    previous: Vec<Reaction>,
    error: ChatError,
) {
    if let Some(message) = state.messages.get_mut(message_id) {
        message.reactions = previous;
        message.error = Some(error);
    }
}

/// Report has no optimistic effect; a failure only leaves its mark.
pub(crate) fn record_message_error(state: &mut ChatState, message_id: &str, error: ChatError) {
    if let Some(message) = state.messages.get_mut(message_id) {
        message.error = Some(error);
    }
}

fn toggle_reaction(reactions: &mut Vec<Reaction>, emoji: &str) -> bool {
    if let Some(idx) = reactions.iter().position(|r| r.emoji == emoji) {
        let reaction = &mut reactions[idx];
        if reaction.reacted_by_me {
            reaction.reacted_by_me = false;
            reaction.count = reaction.count.saturating_sub(1);
            if reaction.count == 0 {
                reactions.remove(idx);
            }
            false
        } else {
            reaction.reacted_by_me = true;
            reaction.count += 1;
            true
        }
    } else {
        reactions.push(Reaction {
            emoji: emoji.to_string(),
            count: 1,
            reacted_by_me: true,
        });
        true
    }
}
