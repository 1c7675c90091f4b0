//! Upstream authentication tokens.
//!
//! The upstream service authenticates with a Firebase ID token obtained by
//! anonymous sign-up against the Google identity toolkit. The provider is a
//! trait so the proxy pipeline can be driven in tests without touching the
//! network.

use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use serde::Deserialize;

const FIREBASE_SIGNUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const FIREBASE_CLIENT_VERSION: &str = "Chrome/JsCore/10.13.1/FirebaseCore-web";

/// Injected capability: something that can produce a bearer token for the
/// upstream service.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, client: &reqwest::Client) -> Result<String>;
}

/// Anonymous Firebase sign-up, one fresh token per request.
pub struct FirebaseTokenProvider {
    api_key_env: String,
    user_agent: String,
}

impl FirebaseTokenProvider {
    pub fn new(api_key_env: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            api_key_env: api_key_env.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(rename = "idToken", default)]
    id_token: Option<String>,
}

#[async_trait]
impl TokenProvider for FirebaseTokenProvider {
    async fn fetch_token(&self, client: &reqwest::Client) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            ProxyError::auth(format!(
                "Environment variable '{}' not set. Set it to your Google API key.",
                self.api_key_env
            ))
        })?;

        let url = format!("{FIREBASE_SIGNUP_URL}?key={api_key}");
        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Client-Version", FIREBASE_CLIENT_VERSION)
            .header("User-Agent", &self.user_agent)
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| ProxyError::auth(format!("Token request failed: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(ProxyError::auth(format!(
                "Token endpoint returned status {status}"
            )));
        }

        let parsed: SignUpResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::auth(format!("Failed to parse token response: {e}")))?;

        match parsed.id_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ProxyError::auth("Received empty token")),
        }
    }
}

/// Fixed token, for tests and pre-provisioned deployments.
pub struct StaticTokenProvider(pub String);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, _client: &reqwest::Client) -> Result<String> {
        Ok(self.0.clone())
    }
}
