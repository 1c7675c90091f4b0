use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The upstream unified-thread endpoint.
pub const MERLIN_API_URL: &str = "https://www.getmerlin.in/arcane/api/v2/thread/unified";

/// Browser-like user agent sent upstream when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Models clients may request. An empty list allows any model.
    #[serde(default = "crate::models::default_models")]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Env var holding the inbound bearer token. When the variable is unset,
    /// the endpoint is open.
    #[serde(default = "default_auth_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Env var holding the Google API key used for anonymous token sign-up.
    #[serde(default = "default_google_api_key_env")]
    pub google_api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn default_port() -> u16 {
    8787
}

fn default_auth_token_env() -> String {
    "AUTH_TOKEN".to_string()
}

fn default_api_url() -> String {
    MERLIN_API_URL.to_string()
}

fn default_google_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_auth_token_env(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            google_api_key_env: default_google_api_key_env(),
            user_agent: None,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            auth: AuthConfig::default(),
            upstream: UpstreamConfig::default(),
            models: crate::models::default_models(),
        }
    }
}

impl UpstreamConfig {
    pub fn effective_user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// The inbound bearer token, if one is configured via the env var.
    pub fn resolve_auth_token(&self) -> Option<String> {
        std::env::var(&self.auth.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("merlin-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("merlin-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg)
                    .join("merlin-proxy")
                    .join("config.toml"),
            );
        }
        if let Some(home) = dirs_path() {
            paths.push(
                home.join(".config")
                    .join("merlin-proxy")
                    .join("config.toml"),
            );
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".merlin-proxy.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
