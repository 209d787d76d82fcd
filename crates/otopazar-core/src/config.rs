use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BACKEND_URL, DEFAULT_POLL_INTERVAL_MS};

pub const ENV_BACKEND_URL: &str = "OTOPAZAR_BACKEND_URL";
pub const ENV_API_KEY: &str = "OTOPAZAR_API_KEY";
pub const ENV_ACCESS_TOKEN: &str = "OTOPAZAR_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "OTOPAZAR_USER_ID";

/// Connection settings for the hosted backend and the signed-in viewer.
///
/// Layered as defaults, then a JSON file, then environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub backend_url: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Viewer whose inbox is shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            api_key: String::new(),
            access_token: None,
            user_id: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl CoreConfig {
    pub fn new(backend_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// `<config dir>/otopazar/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("otopazar")
            .join("config.json")
    }

    /// Apply environment overrides on top of the current values
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(user) = lookup(ENV_USER_ID) {
            self.user_id = Some(user);
        }
        self
    }
}

/// Read a camelCase JSON config file. Front ends embed [`CoreConfig`] in
/// their own config type with `#[serde(flatten)]` and load it through here.
pub fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
