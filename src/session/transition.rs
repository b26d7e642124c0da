//! Pure session transition function

use super::{SessionEffect, SessionEvent, SessionState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<SessionEffect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: SessionEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Events the current state does not accept
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A sign-in is already in progress")]
    SignInInProgress,
    #[error("Already signed in (sign out first)")]
    AlreadyAuthenticated,
    #[error("Sign-in attempt {0} is no longer current")]
    StaleSignIn(u64),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function: no I/O, same inputs give the same outputs.
pub fn transition(
    state: &SessionState,
    event: SessionEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Sign-in
        // ============================================================
        (
            SessionState::Unauthenticated | SessionState::Error { .. },
            SessionEvent::SignInStarted { method, attempt },
        ) => Ok(TransitionResult::new(SessionState::Authenticating {
            method,
            attempt,
        })),

        (SessionState::Authenticating { .. }, SessionEvent::SignInStarted { .. }) => {
            Err(TransitionError::SignInInProgress)
        }

        (SessionState::Authenticated { .. }, SessionEvent::SignInStarted { .. }) => {
            Err(TransitionError::AlreadyAuthenticated)
        }

        (
            SessionState::Authenticating { attempt: current, .. },
            SessionEvent::SignInSucceeded { attempt, account },
        ) if *current == attempt => {
            Ok(TransitionResult::new(SessionState::Authenticated { account, attempt })
                .with_effect(SessionEffect::LoadConversations))
        }

        (
            SessionState::Authenticating { attempt: current, .. },
            SessionEvent::SignInFailed { attempt, reason },
        ) if *current == attempt => Ok(TransitionResult::new(SessionState::Error { reason })
            .with_effect(SessionEffect::PurgeStore)),

        (
            _,
            SessionEvent::SignInSucceeded { attempt, .. } | SessionEvent::SignInFailed { attempt, .. },
        ) => Err(TransitionError::StaleSignIn(attempt)),

        // ============================================================
        // Sign-out and credential loss
        // ============================================================
        (_, SessionEvent::SignOutRequested) => {
            Ok(TransitionResult::new(SessionState::Unauthenticated)
                .with_effect(SessionEffect::PurgeStore)
                .with_effect(SessionEffect::InvalidateCredential))
        }

        (SessionState::Authenticated { .. }, SessionEvent::CredentialLost) => {
            Ok(TransitionResult::new(SessionState::Unauthenticated)
                .with_effect(SessionEffect::PurgeStore)
                .with_effect(SessionEffect::InvalidateCredential))
        }

        // Nothing to lose outside an established session
        (state, SessionEvent::CredentialLost) => Ok(TransitionResult::new(state.clone())),
    }
}
