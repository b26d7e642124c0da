//! Client configuration from the environment

use crate::auth::FirebaseConfig;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_REFRESH_SKEW_SECS: u64 = 300;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;
/// Firebase ID tokens live for an hour
const MAX_REFRESH_SKEW_SECS: u64 = 3_600;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chat backend base URL
    pub api_url: String,
    /// Firebase settings; `None` when `FIREBASE_API_KEY` is unset
    pub firebase: Option<FirebaseConfig>,
    pub request_timeout: Duration,
    /// How long before expiry a credential is refreshed
    pub refresh_skew: Duration,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let firebase = var("FIREBASE_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| {
                let mut config = FirebaseConfig::new(api_key);
                if let Some(url) = var("FIREBASE_AUTH_URL") {
                    config.auth_url = url;
                }
                if let Some(url) = var("FIREBASE_TOKEN_URL") {
                    config.token_url = url;
                }
                config
            });

        Self {
            api_url: var("CHAT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            firebase,
            request_timeout: Duration::from_secs(seconds(
                &var,
                "CHAT_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
                MAX_REQUEST_TIMEOUT_SECS,
            )),
            refresh_skew: Duration::from_secs(seconds(
                &var,
                "CHAT_TOKEN_REFRESH_SKEW_SECS",
                DEFAULT_REFRESH_SKEW_SECS,
                MAX_REFRESH_SKEW_SECS,
            )),
            json_logs: var("CHAT_LOG_JSON").is_some_and(|v| matches!(v.as_str(), "1" | "true")),
        }
    }
}

fn seconds(var: &impl Fn(&str) -> Option<String>, name: &str, default: u64, max: u64) -> u64 {
    let Some(raw) = var(name) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > max => {
            tracing::warn!(name, value, max, "Number too large, capping");
            max
        }
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(name, value = %raw, default, "Invalid number, using default");
            default
        }
    }
}
