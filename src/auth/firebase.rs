//! Firebase Authentication over its REST API
//!
//! Password sign-up/sign-in, OAuth id-token exchange and secure-token refresh.

use super::{Account, AuthError, Credential, IdentityProvider, ProviderGrant, SignedIn};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Where and how to reach Firebase Authentication
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub api_key: String,
    /// Identity Toolkit base, e.g. the emulator's `http://localhost:9099/identitytoolkit.googleapis.com/v1`
    pub auth_url: String,
    pub token_url: String,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct FirebaseSession {
    account: Account,
    credential: Credential,
    refresh_token: String,
}

/// Identity provider backed by Firebase Authentication
pub struct FirebaseIdentity {
    client: Client,
    config: FirebaseConfig,
    session: Mutex<Option<FirebaseSession>>,
}

impl FirebaseIdentity {
    pub fn new(client: Client, config: FirebaseConfig) -> Self {
        Self {
            client,
            config,
            session: Mutex::new(None),
        }
    }

    fn accounts_url(&self, action: &str) -> String {
        format!(
            "{}/accounts:{action}?key={}",
            self.config.auth_url.trim_end_matches('/'),
            self.config.api_key
        )
    }

    fn token_url(&self) -> String {
        format!(
            "{}/token?key={}",
            self.config.token_url.trim_end_matches('/'),
            self.config.api_key
        )
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Network(format!("Request timeout: {e}"))
                } else {
                    AuthError::Network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| AuthError::Provider {
            status: status.as_u16(),
            message: format!("Failed to parse response: {e}"),
        })
    }

    /// Store a fresh session and hand back what the caller needs
    fn establish(&self, response: AccountResponse) -> SignedIn {
        let credential = credential_from(response.id_token, response.expires_in.as_deref());
        let account = Account {
            uid: response.local_id,
            email: response.email,
        };
        let session = FirebaseSession {
            account: account.clone(),
            credential: credential.clone(),
            refresh_token: response.refresh_token,
        };
        *self.lock_session() = Some(session);
        tracing::info!(uid = %account.uid, "Signed in to Firebase");
        SignedIn {
            account,
            credential,
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<FirebaseSession>> {
        // A panic while holding this lock leaves the Option intact
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn refresh(&self, session: FirebaseSession) -> Result<Credential, AuthError> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &session.refresh_token,
        };
        let result: Result<RefreshResponse, AuthError> = self.post(&self.token_url(), &request).await;

        let mut guard = self.lock_session();
        match result {
            Ok(response) => {
                let credential = credential_from(response.id_token, response.expires_in.as_deref());
                // Signed out (or in as someone else) while refreshing
                let still_current = guard
                    .as_ref()
                    .is_some_and(|s| s.refresh_token == session.refresh_token);
                if !still_current {
                    return Err(AuthError::Unavailable);
                }
                *guard = Some(FirebaseSession {
                    account: session.account,
                    credential: credential.clone(),
                    refresh_token: response.refresh_token,
                });
                tracing::debug!("Firebase token refreshed");
                Ok(credential)
            }
            Err(err) => {
                if err.ends_session() {
                    *guard = None;
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = self.post(&self.accounts_url("signUp"), &request).await?;
        Ok(self.establish(response))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = self
            .post(&self.accounts_url("signInWithPassword"), &request)
            .await?;
        Ok(self.establish(response))
    }

    async fn sign_in_with_provider(&self, grant: &ProviderGrant) -> Result<SignedIn, AuthError> {
        let post_body = format!(
            "id_token={}&providerId={}",
            utf8_percent_encode(&grant.id_token, NON_ALPHANUMERIC),
            utf8_percent_encode(&grant.provider_id, NON_ALPHANUMERIC),
        );
        let request = IdpRequest {
            post_body,
            request_uri: "http://localhost",
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response = self
            .post(&self.accounts_url("signInWithIdp"), &request)
            .await?;
        Ok(self.establish(response))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.lock_session().take() {
            tracing::info!(uid = %session.account.uid, "Signed out of Firebase");
        }
        Ok(())
    }

    async fn get_token(&self, force_refresh: bool) -> Result<Credential, AuthError> {
        let session = self.lock_session().clone().ok_or(AuthError::Unavailable)?;
        if !force_refresh && session.credential.is_fresh_at(Utc::now(), Duration::zero()) {
            return Ok(session.credential);
        }
        self.refresh(session).await
    }
}

fn credential_from(id_token: String, expires_in: Option<&str>) -> Credential {
    match expires_in
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(Duration::try_seconds)
    {
        Some(lifetime) => Credential::expiring_in(id_token, lifetime),
        None => Credential::new(id_token),
    }
}

/// Map a Firebase error body to a typed error.
///
/// Firebase reports `{"error": {"code": 400, "message": "EMAIL_EXISTS"}}`;
/// some messages carry detail after the code, e.g. `WEAK_PASSWORD : ...`.
fn classify_error(status: StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map_or_else(|_| body.to_string(), |envelope| envelope.error.message);
    let code = message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or_default();

    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL"
        | "MISSING_PASSWORD" => AuthError::InvalidCredentials(message),
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "WEAK_PASSWORD" => AuthError::WeakPassword(message),
        "TOKEN_EXPIRED" | "USER_DISABLED" | "USER_NOT_FOUND" | "INVALID_REFRESH_TOKEN"
        | "INVALID_ID_TOKEN" => AuthError::SessionRevoked(message),
        _ => AuthError::Provider {
            status: status.as_u16(),
            message,
        },
    }
}

// Firebase wire types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: &'static str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    id_token: String,
    refresh_token: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
