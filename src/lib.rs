//! Chat session and conversation synchronization client
//!
//! Keeps a local view of a user's conversations consistent with the chat
//! backend: credential lifecycle, conversation and message loading with
//! stale-result discard, and optimistic message sending.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod model;
pub mod send;
pub mod session;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use client::{ChatClient, ClientError};
pub use config::ClientConfig;
pub use model::{Conversation, DeliveryStatus, Message, Role};
pub use send::{SendError, SendPipeline, SendReceipt};
pub use session::{SessionController, SessionError, SessionState};
pub use store::{ConversationStore, LoadOutcome};
