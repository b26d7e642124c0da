//! Wiring of the whole client from configuration

use crate::api::{ApiClient, ChatBackend, HttpChatBackend, LoggingBackend};
use crate::auth::{FirebaseIdentity, IdentityProvider, TokenProvider};
use crate::config::ClientConfig;
use crate::send::SendPipeline;
use crate::session::SessionController;
use crate::store::ConversationStore;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("FIREBASE_API_KEY is not set")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// One signed-in-user's worth of client state.
///
/// Every component shares the same token provider, so the credential has a
/// single owner.
pub struct ChatClient {
    pub session: Arc<SessionController>,
    pub pipeline: SendPipeline,
}

impl ChatClient {
    /// Build against Firebase and the HTTP backend described by `config`
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let firebase = config.firebase.clone().ok_or(ClientError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let identity: Arc<dyn IdentityProvider> = Arc::new(FirebaseIdentity::new(http.clone(), firebase));
        let tokens = Arc::new(TokenProvider::new(identity.clone(), config.refresh_skew));
        let api = ApiClient::new(http, &config.api_url, tokens.clone());
        let backend: Arc<dyn ChatBackend> =
            Arc::new(LoggingBackend::new(Arc::new(HttpChatBackend::new(api))));

        tracing::info!(api_url = %config.api_url, "Chat client configured");
        Ok(Self::with_parts(identity, tokens, backend))
    }

    /// Assemble from already built parts
    pub fn with_parts(
        identity: Arc<dyn IdentityProvider>,
        tokens: Arc<TokenProvider>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let store = Arc::new(ConversationStore::new(backend.clone()));
        let session = Arc::new(SessionController::new(identity, tokens, store.clone()));
        Self {
            session,
            pipeline: SendPipeline::new(store, backend),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        self.session.store()
    }
}
