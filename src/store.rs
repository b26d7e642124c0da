//! Conversation list and active message sequence
//!
//! The store is the only owner of conversation state. Every backend result is
//! tagged when its request starts and applied only if the tag still matches:
//! a message load by conversation id and ticket, every load by the purge
//! epoch. Results that lost the race are dropped.

#[cfg(test)]
mod proptests;

use crate::api::{ApiError, ChatBackend};
use crate::model::{title_from_first_message, Conversation, DeliveryStatus, Message, Role};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

/// What happened to a load result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result replaced the store's state
    Applied,
    /// A newer request or a purge superseded it
    Discarded,
}

struct ActiveConversation {
    id: String,
    ticket: u64,
    messages: Vec<Message>,
    loading: bool,
    /// Whether a server history has been applied since it became active
    synced: bool,
}

#[derive(Default)]
struct StoreInner {
    /// Bumped by every purge
    epoch: u64,
    conversations: Vec<Conversation>,
    list_ticket: u64,
    active: Option<ActiveConversation>,
    next_ticket: u64,
}

impl StoreInner {
    /// Active conversation, if it is `conversation_id`
    fn active_mut(&mut self, conversation_id: &str) -> Option<&mut ActiveConversation> {
        self.active.as_mut().filter(|a| a.id == conversation_id)
    }
}

/// In-memory view of the signed-in user's conversations.
///
/// Holds at most one message sequence: the most recently requested
/// conversation's.
pub struct ConversationStore {
    backend: Arc<dyn ChatBackend>,
    inner: Mutex<StoreInner>,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace the conversation list with the backend's.
    ///
    /// On failure the previous list is kept.
    pub async fn load_conversations(&self) -> Result<LoadOutcome, ApiError> {
        let epoch = self.epoch();
        self.load_conversations_at(epoch).await
    }

    /// Load the list on behalf of the store generation `epoch`. Nothing is
    /// requested or applied once a purge has moved past it.
    pub(crate) async fn load_conversations_at(&self, epoch: u64) -> Result<LoadOutcome, ApiError> {
        let ticket = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                tracing::debug!(epoch, current = inner.epoch, "Skipping list load for purged store");
                return Ok(LoadOutcome::Discarded);
            }
            inner.list_ticket += 1;
            inner.list_ticket
        };

        let result = self.backend.list_conversations().await;

        let mut inner = self.lock();
        if inner.epoch != epoch || inner.list_ticket != ticket {
            tracing::debug!(ok = result.is_ok(), "Discarding stale conversation list");
            return Ok(LoadOutcome::Discarded);
        }
        let conversations = result?;
        tracing::debug!(count = conversations.len(), "Conversation list loaded");
        inner.conversations = conversations;
        Ok(LoadOutcome::Applied)
    }

    /// Create a conversation and put it first in the list
    pub async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        let epoch = self.lock().epoch;

        let conversation = self.backend.create_conversation(title).await?;

        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.conversations.retain(|c| c.id != conversation.id);
            inner.conversations.insert(0, conversation.clone());
            tracing::info!(conversation_id = %conversation.id, "Conversation created");
        } else {
            tracing::debug!(conversation_id = %conversation.id, "Store purged during create");
        }
        Ok(conversation)
    }

    /// Make `conversation_id` active and load its messages.
    ///
    /// Switching conversations drops the previous messages at once. Reloading
    /// the active conversation keeps its messages until the result lands.
    pub async fn load_messages(&self, conversation_id: &str) -> Result<LoadOutcome, ApiError> {
        let (epoch, ticket) = {
            let mut inner = self.lock();
            inner.next_ticket += 1;
            let ticket = inner.next_ticket;
            match inner.active_mut(conversation_id) {
                Some(active) => {
                    active.ticket = ticket;
                    active.loading = true;
                }
                None => {
                    inner.active = Some(ActiveConversation {
                        id: conversation_id.to_string(),
                        ticket,
                        messages: Vec::new(),
                        loading: true,
                        synced: false,
                    });
                }
            }
            (inner.epoch, ticket)
        };

        let result = self.backend.get_messages(conversation_id).await;

        let mut inner = self.lock();
        let current = inner.epoch == epoch;
        let Some(active) = inner
            .active_mut(conversation_id)
            .filter(|a| current && a.ticket == ticket)
        else {
            tracing::debug!(conversation_id, ticket, ok = result.is_ok(), "Discarding stale message load");
            return Ok(LoadOutcome::Discarded);
        };

        active.loading = false;
        let mut messages = result?;
        let known = if active.synced {
            active.messages.iter().filter(|m| !m.is_unacknowledged()).count()
        } else {
            0
        };
        let unacknowledged = active
            .messages
            .drain(..)
            .filter(|m| m.is_local() && m.is_unacknowledged());
        for local in unacknowledged {
            merge_unacknowledged(&mut messages, known, local);
        }
        tracing::debug!(conversation_id, count = messages.len(), "Messages loaded");
        active.messages = messages;
        active.synced = true;
        Ok(LoadOutcome::Applied)
    }

    /// Leave the active conversation. In-flight results for it are dropped.
    pub fn close_conversation(&self) {
        self.lock().active = None;
    }

    /// Current purge generation
    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Purge everything; results of requests started before now are dropped
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.conversations.clear();
        inner.active = None;
        tracing::debug!(epoch = inner.epoch, "Store cleared");
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    /// Messages of the active conversation, empty when none is active
    pub fn messages(&self) -> Vec<Message> {
        self.lock()
            .active
            .as_ref()
            .map(|a| a.messages.clone())
            .unwrap_or_default()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.lock().active.as_ref().map(|a| a.id.clone())
    }

    /// Whether the active conversation's messages are being loaded
    pub fn is_loading(&self) -> bool {
        self.lock().active.as_ref().is_some_and(|a| a.loading)
    }

    // ------------------------------------------------------------------------
    // Send lane. Each call is a no-op returning false/None unless
    // `conversation_id` is still active.
    // ------------------------------------------------------------------------

    pub(crate) fn append_pending(&self, conversation_id: &str, message: Message) -> bool {
        let mut inner = self.lock();
        match inner.active_mut(conversation_id) {
            Some(active) => {
                active.messages.push(message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn find_message(&self, conversation_id: &str, message_id: &str) -> Option<Message> {
        let mut inner = self.lock();
        inner
            .active_mut(conversation_id)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub(crate) fn set_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) -> bool {
        let mut inner = self.lock();
        let Some(message) = inner
            .active_mut(conversation_id)
            .and_then(|a| a.messages.iter_mut().find(|m| m.id == message_id))
        else {
            return false;
        };
        message.status = status;
        true
    }

    /// Confirm the user message and append the assistant reply after it
    pub(crate) fn confirm_sent(
        &self,
        conversation_id: &str,
        message_id: &str,
        reply: Message,
    ) -> bool {
        let mut inner = self.lock();
        let Some(active) = inner.active_mut(conversation_id) else {
            return false;
        };
        let Some(index) = active.messages.iter().position(|m| m.id == message_id) else {
            return false;
        };

        let first_message = index == 0 && active.synced;
        let sent = &mut active.messages[index];
        sent.status = DeliveryStatus::Confirmed;
        let title = first_message.then(|| title_from_first_message(&sent.content));
        // A reload may already have brought the reply in
        if !active.messages.iter().any(|m| m.id == reply.id) {
            active.messages.push(reply);
        }

        if let Some(title) = title {
            if let Some(conversation) = inner.conversations.iter_mut().find(|c| c.id == conversation_id) {
                conversation.title = title;
                conversation.updated_at = Some(Utc::now());
            }
        }
        true
    }

    /// Remove a local message that the backend never acknowledged
    pub(crate) fn remove_unacknowledged(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Option<Message> {
        let mut inner = self.lock();
        let active = inner.active_mut(conversation_id)?;
        let index = active
            .messages
            .iter()
            .position(|m| m.id == message_id && m.is_local() && m.is_unacknowledged())?;
        Some(active.messages.remove(index))
    }
}

/// Put a local message back into a freshly loaded history.
///
/// The backend stores a user message before answering it, so the history may
/// already hold the server copy. That copy is searched among the messages
/// after the first `known` ones and, when found, the local message takes its
/// place. Otherwise the local message goes last.
fn merge_unacknowledged(messages: &mut Vec<Message>, known: usize, local: Message) {
    let server_copy = messages
        .iter()
        .enumerate()
        .skip(known)
        .find(|(_, m)| m.role == Role::User && !m.is_local() && m.content == local.content)
        .map(|(index, _)| index);
    match server_copy {
        Some(index) => messages[index] = local,
        None => messages.push(local),
    }
}
