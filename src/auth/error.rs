//! Identity errors

use thiserror::Error;

/// Failure reported by the identity side
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Nobody is signed in. Callers treat this as "not authenticated".
    #[error("No user is signed in")]
    Unavailable,

    #[error("Invalid email or password: {0}")]
    InvalidCredentials(String),

    #[error("Email address is already in use")]
    EmailInUse,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    /// The stored session can no longer be refreshed
    #[error("Session was revoked: {0}")]
    SessionRevoked(String),

    #[error("Identity provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Identity provider unreachable: {0}")]
    Network(String),
}

impl AuthError {
    /// Whether the credential behind this error is gone for good
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::Unavailable | Self::SessionRevoked(_))
    }

    /// Whether the identity provider itself is failing, not the user's session
    pub fn is_outage(&self) -> bool {
        matches!(self, Self::Network(_))
            || matches!(self, Self::Provider { status, .. } if *status >= 500)
    }
}
