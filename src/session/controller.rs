//! Session controller: applies transitions and executes their effects

use super::{
    transition, SessionEffect, SessionEvent, SessionState, SignInMethod, TransitionError,
};
use crate::api::ApiError;
use crate::auth::{
    Account, AuthError, IdentityProvider, ProviderGrant, SignOutReason, SignedIn, TokenProvider,
};
use crate::store::{ConversationStore, LoadOutcome};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The identity provider's answer, as it gave it
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A completed sign-in
#[derive(Debug)]
pub struct SignedInSession {
    pub account: Account,
    /// Outcome of the initial conversation list load
    pub initial_load: Result<LoadOutcome, ApiError>,
}

/// Owns the session state and binds it to the token provider and the store.
///
/// Whenever the session leaves `Authenticated`, the store is purged so the
/// next user never sees the previous one's conversations.
pub struct SessionController {
    identity: Arc<dyn IdentityProvider>,
    tokens: Arc<TokenProvider>,
    store: Arc<ConversationStore>,
    state: Mutex<SessionState>,
    attempts: AtomicU64,
}

impl SessionController {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        tokens: Arc<TokenProvider>,
        store: Arc<ConversationStore>,
    ) -> Self {
        Self {
            identity,
            tokens,
            store,
            state: Mutex::new(SessionState::Unauthenticated),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply `event` and return the effects to run, with the store epoch they
    /// belong to. The lock is released before any effect runs.
    fn apply(&self, event: SessionEvent) -> Result<(Vec<SessionEffect>, u64), TransitionError> {
        let mut state = self.lock();
        let result = transition(&state, event)?;
        let epoch = self.store.epoch();
        if result.new_state.name() != state.name() {
            tracing::info!(
                from = state.name(),
                to = result.new_state.name(),
                "Session transition"
            );
        }
        *state = result.new_state;
        Ok((result.effects, epoch))
    }

    /// Store epoch of the session established by `attempt`, if it is still
    /// the current session
    fn session_epoch(&self, attempt: u64) -> Option<u64> {
        match &*self.lock() {
            SessionState::Authenticated { attempt: current, .. } if *current == attempt => {
                Some(self.store.epoch())
            }
            _ => None,
        }
    }

    /// Run effects in order; returns the conversation load outcome if one ran.
    /// A load only lands while the store is still at `epoch`.
    async fn run_effects(
        &self,
        effects: Vec<SessionEffect>,
        epoch: u64,
    ) -> Option<Result<LoadOutcome, ApiError>> {
        let mut load = None;
        for effect in effects {
            match effect {
                SessionEffect::LoadConversations => {
                    load = Some(self.store.load_conversations_at(epoch).await);
                }
                SessionEffect::PurgeStore => self.store.clear(),
                SessionEffect::InvalidateCredential => {
                    if let Err(err) = self.identity.sign_out().await {
                        tracing::warn!(error = %err, "Identity sign-out failed");
                    }
                    self.tokens.discard(SignOutReason::UserRequested).await;
                }
            }
        }
        load
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInSession, SessionError> {
        self.authenticate(SignInMethod::Password, || self.identity.sign_in(email, password))
            .await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignedInSession, SessionError> {
        self.authenticate(SignInMethod::SignUp, || self.identity.sign_up(email, password))
            .await
    }

    pub async fn sign_in_with_provider(
        &self,
        grant: &ProviderGrant,
    ) -> Result<SignedInSession, SessionError> {
        self.authenticate(SignInMethod::Provider(grant.provider_id.clone()), || {
            self.identity.sign_in_with_provider(grant)
        })
        .await
    }

    async fn authenticate<F, Fut>(
        &self,
        method: SignInMethod,
        attempt_sign_in: F,
    ) -> Result<SignedInSession, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SignedIn, AuthError>>,
    {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let (effects, epoch) = self.apply(SessionEvent::SignInStarted { method, attempt })?;
        self.run_effects(effects, epoch).await;

        match attempt_sign_in().await {
            Ok(SignedIn { account, credential }) => {
                let event = SessionEvent::SignInSucceeded {
                    attempt,
                    account: account.clone(),
                };
                let effects = match self.apply(event) {
                    Ok((effects, _)) => effects,
                    Err(err) => {
                        tracing::warn!(attempt, error = %err, "Discarding late sign-in");
                        if matches!(self.state(), SessionState::Unauthenticated) {
                            if let Err(err) = self.identity.sign_out().await {
                                tracing::warn!(error = %err, "Identity sign-out failed");
                            }
                        }
                        return Err(err.into());
                    }
                };
                self.tokens.prime(credential).await;
                // A sign-out may have run while the credential was stored
                let Some(epoch) = self.session_epoch(attempt) else {
                    tracing::warn!(attempt, "Session ended while signing in");
                    if !self.state().is_authenticated() {
                        self.tokens.discard(SignOutReason::UserRequested).await;
                    }
                    return Err(TransitionError::StaleSignIn(attempt).into());
                };
                tracing::info!(uid = %account.uid, "Signed in");

                let initial_load = self
                    .run_effects(effects, epoch)
                    .await
                    .unwrap_or(Ok(LoadOutcome::Discarded));
                Ok(SignedInSession {
                    account,
                    initial_load,
                })
            }
            Err(reason) => {
                tracing::warn!(attempt, error = %reason, "Sign-in failed");
                match self.apply(SessionEvent::SignInFailed {
                    attempt,
                    reason: reason.clone(),
                }) {
                    Ok((effects, epoch)) => {
                        self.run_effects(effects, epoch).await;
                    }
                    Err(err) => tracing::debug!(attempt, error = %err, "Late sign-in failure ignored"),
                }
                Err(reason.into())
            }
        }
    }

    /// Sign out from any state. Always ends unauthenticated with an empty store.
    pub async fn sign_out(&self) {
        match self.apply(SessionEvent::SignOutRequested) {
            Ok((effects, epoch)) => {
                self.run_effects(effects, epoch).await;
            }
            Err(err) => tracing::error!(error = %err, "Sign-out rejected"),
        }
    }

    /// End the session when the token provider reports a revoked credential.
    ///
    /// The task exits when the token provider's channel closes or the
    /// controller is gone.
    pub fn watch_credential_loss(self: &Arc<Self>) -> JoinHandle<()> {
        let mut signed_out = self.tokens.on_signed_out();
        let controller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match signed_out.recv().await {
                    Ok(SignOutReason::Revoked) => {
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        match controller.apply(SessionEvent::CredentialLost) {
                            Ok((effects, epoch)) => {
                                controller.run_effects(effects, epoch).await;
                            }
                            Err(err) => tracing::error!(error = %err, "Credential loss rejected"),
                        }
                    }
                    Ok(SignOutReason::UserRequested) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
