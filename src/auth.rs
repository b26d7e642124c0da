//! Identity and credential handling
//!
//! The identity provider issues credentials; [`TokenProvider`] caches the
//! current one and refreshes it on demand. Nothing else holds a token.

mod credential;
mod error;
mod firebase;
mod token;

pub use credential::Credential;
pub use error::AuthError;
pub use firebase::{FirebaseConfig, FirebaseIdentity, DEFAULT_AUTH_URL, DEFAULT_TOKEN_URL};
pub use token::{SignOutReason, TokenProvider};

use async_trait::async_trait;
use std::sync::Arc;

/// The signed-in user as far as the session is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: String,
    pub email: Option<String>,
}

/// Result of a successful sign-in or sign-up
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub account: Account,
    pub credential: Credential,
}

/// Token obtained from an external OAuth provider, exchanged for a session
#[derive(Debug, Clone)]
pub struct ProviderGrant {
    /// Provider id as the identity service knows it, e.g. `google.com`
    pub provider_id: String,
    pub id_token: String,
}

impl ProviderGrant {
    pub fn google(id_token: impl Into<String>) -> Self {
        Self {
            provider_id: "google.com".to_string(),
            id_token: id_token.into(),
        }
    }
}

/// External identity service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError>;

    async fn sign_in_with_provider(&self, grant: &ProviderGrant) -> Result<SignedIn, AuthError>;

    /// Forget the signed-in user. Succeeds when nobody is signed in.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Token for the signed-in user, refreshed first when `force_refresh` is set
    /// or the held token has expired
    async fn get_token(&self, force_refresh: bool) -> Result<Credential, AuthError>;
}

/// Anything that can hand out a current credential
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn current_token(&self) -> Result<Credential, AuthError>;
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        (**self).sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        (**self).sign_in(email, password).await
    }

    async fn sign_in_with_provider(&self, grant: &ProviderGrant) -> Result<SignedIn, AuthError> {
        (**self).sign_in_with_provider(grant).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        (**self).sign_out().await
    }

    async fn get_token(&self, force_refresh: bool) -> Result<Credential, AuthError> {
        (**self).get_token(force_refresh).await
    }
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn current_token(&self) -> Result<Credential, AuthError> {
        (**self).current_token().await
    }
}
