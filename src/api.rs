//! Backend access
//!
//! [`ApiClient`] executes authenticated JSON requests; [`ChatBackend`] is the
//! typed view of the conversation endpoints built on top of it.

mod backend;
mod client;
mod error;
mod types;

pub use backend::{ChatBackend, HttpChatBackend, LoggingBackend};
pub use client::ApiClient;
pub use error::ApiError;
pub use types::ChatReply;
