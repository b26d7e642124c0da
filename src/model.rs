//! Conversation and message types shared by the store, the send pipeline and
//! the backend client.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix for ids synthesized on this side of the wire.
///
/// Backend ids are UUIDs, so anything in this namespace is known to be local.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Title the backend gives a conversation that is retitled from its first message
const TITLE_FROM_MESSAGE_CHARS: usize = 30;

/// A conversation as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_title() -> String {
    "Untitled Conversation".to_string()
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Title the backend assigns after the first message of a conversation
pub fn title_from_first_message(content: &str) -> String {
    if content.chars().count() > TITLE_FROM_MESSAGE_CHARS {
        let head: String = content.chars().take(TITLE_FROM_MESSAGE_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Local delivery state of a message. Never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryStatus {
    /// Optimistically shown, request in flight
    Pending,
    /// Acknowledged by the backend, or loaded from it
    #[default]
    Confirmed,
    /// The send request failed; may be retried or discarded
    Failed,
}

/// A single message in the active conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub role: Role,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub status: DeliveryStatus,
}

impl Message {
    /// Optimistic user message with a fresh local id
    pub fn pending_user(content: impl Into<String>) -> Self {
        Self {
            id: local_id(),
            content: content.into(),
            role: Role::User,
            created_at: Utc::now(),
            status: DeliveryStatus::Pending,
        }
    }

    /// Assistant reply as acknowledged by the backend
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            role: Role::Assistant,
            created_at: Utc::now(),
            status: DeliveryStatus::Confirmed,
        }
    }

    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    /// Local messages the server has not acknowledged yet
    pub fn is_unacknowledged(&self) -> bool {
        matches!(self.status, DeliveryStatus::Pending | DeliveryStatus::Failed)
    }
}

/// Generate an id in the local namespace
pub fn local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Lenient timestamp decoding.
///
/// The backend writes `datetime.isoformat()` values, which usually carry no
/// offset. RFC 3339 is tried first, then naive ISO-8601 read as UTC.
pub(crate) mod timestamp {
    use super::{DateTime, Deserialize, Deserializer, NaiveDateTime, Utc};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(deserialize_opt(deserializer)?.unwrap_or_else(Utc::now))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}
