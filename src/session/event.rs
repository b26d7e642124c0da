//! Events that drive the session

use super::state::SignInMethod;
use crate::auth::{Account, AuthError};

/// Events that trigger session transitions.
///
/// Sign-in outcomes carry the attempt number they belong to, so a completion
/// that arrives after the user moved on is recognized.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignInStarted { method: SignInMethod, attempt: u64 },
    SignInSucceeded { attempt: u64, account: Account },
    SignInFailed { attempt: u64, reason: AuthError },
    SignOutRequested,
    /// The identity provider refused to refresh the credential
    CredentialLost,
}
