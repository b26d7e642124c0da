//! Optimistic message sending
//!
//! A message shows up in the store before the backend sees it. When the
//! backend answers, the message is confirmed and the reply appended; when it
//! fails, the message stays visible as failed until retried or discarded.

use crate::api::{ApiError, ChatBackend, ChatReply};
use crate::model::{DeliveryStatus, Message, Role};
use crate::store::ConversationStore;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Message is empty")]
    EmptyInput,

    #[error("No conversation is open")]
    NoActiveConversation,

    /// Only failed user messages can be retried or discarded
    #[error("Message {0} is not a failed message")]
    NotRetryable(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result of a completed send
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    /// Id of the user message (local namespace)
    pub message_id: String,
    /// The assistant's reply, or `None` if the user left the conversation
    /// before it arrived
    pub reply: Option<Message>,
}

/// Sends user messages against the store's active conversation
pub struct SendPipeline {
    store: Arc<ConversationStore>,
    backend: Arc<dyn ChatBackend>,
}

impl SendPipeline {
    pub fn new(store: Arc<ConversationStore>, backend: Arc<dyn ChatBackend>) -> Self {
        Self { store, backend }
    }

    /// Send `content` to `conversation_id`, which must be the active conversation.
    ///
    /// Callers must not start a second send for a conversation while one is
    /// in flight.
    pub async fn send(
        &self,
        conversation_id: Option<&str>,
        content: &str,
    ) -> Result<SendReceipt, SendError> {
        if content.trim().is_empty() {
            return Err(SendError::EmptyInput);
        }
        let conversation_id = conversation_id.ok_or(SendError::NoActiveConversation)?;

        let message = Message::pending_user(content);
        let message_id = message.id.clone();
        if !self.store.append_pending(conversation_id, message) {
            return Err(SendError::NoActiveConversation);
        }
        tracing::debug!(conversation_id, message_id = %message_id, "Message pending");

        self.submit(conversation_id, message_id, content).await
    }

    /// Resubmit a failed message in place
    pub async fn retry(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<SendReceipt, SendError> {
        let message = self.failed_message(conversation_id, message_id)?;
        self.store
            .set_status(conversation_id, message_id, DeliveryStatus::Pending);
        tracing::debug!(conversation_id, message_id, "Retrying message");

        self.submit(conversation_id, message.id, &message.content)
            .await
    }

    /// Remove a failed message from the conversation
    pub fn discard_failed(&self, conversation_id: &str, message_id: &str) -> Result<(), SendError> {
        self.failed_message(conversation_id, message_id)?;
        self.store
            .remove_unacknowledged(conversation_id, message_id)
            .map(|_| ())
            .ok_or_else(|| SendError::NotRetryable(message_id.to_string()))
    }

    fn failed_message(&self, conversation_id: &str, message_id: &str) -> Result<Message, SendError> {
        if self.store.active_conversation_id().as_deref() != Some(conversation_id) {
            return Err(SendError::NoActiveConversation);
        }
        self.store
            .find_message(conversation_id, message_id)
            .filter(|m| m.role == Role::User && m.status == DeliveryStatus::Failed)
            .ok_or_else(|| SendError::NotRetryable(message_id.to_string()))
    }

    async fn submit(
        &self,
        conversation_id: &str,
        message_id: String,
        content: &str,
    ) -> Result<SendReceipt, SendError> {
        match self.backend.send_message(conversation_id, content).await {
            Ok(ChatReply {
                message_id: reply_id,
                content: reply_content,
                ..
            }) => {
                let reply = Message::assistant(reply_id, reply_content);
                if self
                    .store
                    .confirm_sent(conversation_id, &message_id, reply.clone())
                {
                    tracing::info!(conversation_id, message_id = %message_id, reply_id = %reply.id, "Message sent");
                    Ok(SendReceipt {
                        message_id,
                        reply: Some(reply),
                    })
                } else {
                    tracing::debug!(conversation_id, message_id = %message_id, "Reply for inactive conversation dropped");
                    Ok(SendReceipt {
                        message_id,
                        reply: None,
                    })
                }
            }
            Err(err) => {
                self.store
                    .set_status(conversation_id, &message_id, DeliveryStatus::Failed);
                tracing::warn!(conversation_id, message_id = %message_id, error = %err, "Message send failed");
                Err(err.into())
            }
        }
    }
}
