//! Typed view of the chat backend

use super::types::{
    ChatReply, ChatRequest, ConversationListResponse, ConversationResponse,
    CreateConversationRequest, MessagesResponse,
};
use super::{ApiClient, ApiError};
use crate::model::{Conversation, Message};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Characters escaped in a single path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Conversation-level operations the store and send pipeline depend on
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError>;

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Submit a user message; the reply is always the assistant's
    async fn send_message(&self, conversation_id: &str, content: &str)
        -> Result<ChatReply, ApiError>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        (**self).list_conversations().await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        (**self).create_conversation(title).await
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError> {
        (**self).get_messages(conversation_id).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<ChatReply, ApiError> {
        (**self).send_message(conversation_id, content).await
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// [`ChatBackend`] over the REST contract, executed by [`ApiClient`]
pub struct HttpChatBackend {
    api: ApiClient,
}

impl HttpChatBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<R, ApiError> {
        let value = self.api.request(method, path, body.as_ref()).await?;
        serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

fn to_body(body: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let response: ConversationListResponse =
            self.call(Method::GET, "/api/conversations", None).await?;
        Ok(response.conversations)
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        let body = to_body(&CreateConversationRequest { title })?;
        let response: ConversationResponse = self
            .call(Method::POST, "/api/conversations", Some(body))
            .await?;
        Ok(response.conversation)
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError> {
        let path = format!(
            "/api/conversations/{}",
            utf8_percent_encode(conversation_id, SEGMENT)
        );
        let response: MessagesResponse = self.call(Method::GET, &path, None).await?;
        Ok(response.messages)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<ChatReply, ApiError> {
        let body = to_body(&ChatRequest {
            content,
            conversation_id,
        })?;
        self.call(Method::POST, "/api/chat", Some(body)).await
    }
}

// ============================================================================
// Logging decorator
// ============================================================================

/// Logs timing and outcome of every backend call
pub struct LoggingBackend {
    inner: Arc<dyn ChatBackend>,
}

impl LoggingBackend {
    pub fn new(inner: Arc<dyn ChatBackend>) -> Self {
        Self { inner }
    }
}

fn log_outcome<T>(operation: &str, started: std::time::Instant, result: &Result<T, ApiError>) {
    let duration_ms = started.elapsed().as_millis();
    match result {
        Ok(_) => tracing::debug!(operation, %duration_ms, "Backend call completed"),
        Err(e) => tracing::warn!(operation, %duration_ms, error = %e, "Backend call failed"),
    }
}

#[async_trait]
impl ChatBackend for LoggingBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let started = std::time::Instant::now();
        let result = self.inner.list_conversations().await;
        log_outcome("list_conversations", started, &result);
        result
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        let started = std::time::Instant::now();
        let result = self.inner.create_conversation(title).await;
        log_outcome("create_conversation", started, &result);
        result
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError> {
        let started = std::time::Instant::now();
        let result = self.inner.get_messages(conversation_id).await;
        log_outcome("get_messages", started, &result);
        result
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<ChatReply, ApiError> {
        let started = std::time::Instant::now();
        let result = self.inner.send_message(conversation_id, content).await;
        log_outcome("send_message", started, &result);
        result
    }
}
