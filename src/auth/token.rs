//! Cached, refresh-on-demand credential

use super::{AuthError, Credential, IdentityProvider, TokenSource};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Why the credential went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The user asked to sign out
    UserRequested,
    /// The identity provider refused to refresh the credential
    Revoked,
}

#[derive(Default)]
struct TokenState {
    credential: Option<Credential>,
    /// Set by [`TokenProvider::expire`]; the next read refreshes
    stale: bool,
}

/// Sole owner of the current credential.
///
/// Reads return the cached credential while it is fresh. A refresh holds the
/// state lock across the identity call, so concurrent readers wait for one
/// refresh instead of starting their own.
pub struct TokenProvider {
    identity: Arc<dyn IdentityProvider>,
    refresh_skew: Duration,
    state: Mutex<TokenState>,
    signed_out_tx: broadcast::Sender<SignOutReason>,
}

impl TokenProvider {
    pub fn new(identity: Arc<dyn IdentityProvider>, refresh_skew: std::time::Duration) -> Self {
        let (signed_out_tx, _) = broadcast::channel(16);
        Self {
            identity,
            refresh_skew: Duration::from_std(refresh_skew).unwrap_or_else(|_| Duration::zero()),
            state: Mutex::new(TokenState::default()),
            signed_out_tx,
        }
    }

    /// Current credential, refreshed first if it is at or near expiry
    pub async fn current_token(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;

        if !state.stale {
            if let Some(credential) = &state.credential {
                if credential.is_fresh_at(Utc::now(), self.refresh_skew) {
                    return Ok(credential.clone());
                }
            }
        }

        let had_credential = state.credential.is_some();
        tracing::debug!(forced = had_credential, "Refreshing credential");

        match self.identity.get_token(had_credential).await {
            Ok(credential) => {
                state.credential = Some(credential.clone());
                state.stale = false;
                Ok(credential)
            }
            Err(err) => {
                if had_credential && err.ends_session() {
                    state.credential = None;
                    state.stale = false;
                    drop(state);
                    tracing::warn!(error = %err, "Credential refresh rejected, signing out");
                    let _ = self.signed_out_tx.send(SignOutReason::Revoked);
                } else {
                    tracing::warn!(error = %err, "Credential refresh failed");
                }
                Err(err)
            }
        }
    }

    /// Subscribe to sign-out notifications
    pub fn on_signed_out(&self) -> broadcast::Receiver<SignOutReason> {
        self.signed_out_tx.subscribe()
    }

    /// Store the credential issued by a sign-in
    pub async fn prime(&self, credential: Credential) {
        let mut state = self.state.lock().await;
        state.credential = Some(credential);
        state.stale = false;
    }

    /// Force the next read to refresh
    pub async fn expire(&self) {
        self.state.lock().await.stale = true;
    }

    /// Drop the credential and notify subscribers
    pub async fn discard(&self, reason: SignOutReason) {
        let had_credential = {
            let mut state = self.state.lock().await;
            state.stale = false;
            state.credential.take().is_some()
        };
        tracing::debug!(?reason, had_credential, "Credential discarded");
        let _ = self.signed_out_tx.send(reason);
    }

    pub async fn has_credential(&self) -> bool {
        self.state.lock().await.credential.is_some()
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn current_token(&self) -> Result<Credential, AuthError> {
        TokenProvider::current_token(self).await
    }
}
