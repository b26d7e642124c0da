//! Backend request and response bodies

use crate::model::{Conversation, Message};
use serde::{Deserialize, Serialize};

/// Request to create a new conversation
#[derive(Debug, Serialize)]
pub struct CreateConversationRequest<'a> {
    pub title: &'a str,
}

/// Request to send a chat message
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub content: &'a str,
    pub conversation_id: &'a str,
}

/// Response with a list of conversations
#[derive(Debug, Deserialize)]
pub struct ConversationListResponse {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

/// Response with a single conversation
#[derive(Debug, Deserialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

/// Response with a conversation's messages
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Assistant reply to a chat message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub message_id: String,
    pub content: String,
    /// Set when the backend created the conversation on the fly
    #[serde(default)]
    pub conversation_id: Option<String>,
}
