//! Authenticated JSON request executor

use super::ApiError;
use crate::auth::{AuthError, TokenSource};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;

/// Executes backend requests with the current bearer credential.
///
/// Knows nothing about conversations; callers decode the JSON they get back.
/// Never retries.
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `method path` with an optional JSON body
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let credential = match self.tokens.current_token().await {
            Ok(credential) => credential,
            Err(AuthError::Network(cause)) => return Err(ApiError::Network(cause)),
            Err(err) if err.is_outage() => {
                tracing::warn!(%method, path, error = %err, "Identity provider failing, request skipped");
                return Err(ApiError::Network(err.to_string()));
            }
            Err(err) => {
                tracing::debug!(%method, path, error = %err, "No credential, request skipped");
                return Err(ApiError::Unauthenticated);
            }
        };

        let url = format!("{}{path}", self.base_url);
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(credential.token());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ApiError::Network(format!("Connection failed: {e}"))
            } else {
                ApiError::Network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            tracing::warn!(%method, path, status = status.as_u16(), "Backend request failed");
            return Err(ApiError::from_status(status.as_u16(), text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(format!("{e}: {text}")))
    }
}
