//! Backend request errors

use thiserror::Error;

/// Outcome of a failed backend request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No credential was available, or the backend rejected it (401/403)
    #[error("Not authenticated")]
    Unauthenticated,

    /// Non-success status with the response body as text
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// No response at all: connect failure, timeout, broken body
    #[error("Network error: {0}")]
    Network(String),

    /// Success status but a body we could not decode
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Map a non-success status and its body text
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthenticated,
            _ => Self::Http { status, body },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
