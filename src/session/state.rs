//! Session states

use crate::auth::{Account, AuthError};

/// How a sign-in was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInMethod {
    Password,
    SignUp,
    /// OAuth provider, e.g. `google.com`
    Provider(String),
}

/// Where the session stands.
///
/// The credential itself lives in the token provider; the session only
/// knows who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,

    /// A sign-in is in flight
    Authenticating { method: SignInMethod, attempt: u64 },

    /// Signed in by sign-in `attempt`
    Authenticated { account: Account, attempt: u64 },

    /// The last sign-in failed; a new one may be started
    Error { reason: AuthError },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            SessionState::Authenticated { account, .. } => Some(account),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating { .. } => "authenticating",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Error { .. } => "error",
        }
    }
}
