use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::config_json_path;

const CONFIG_FILE_PATH: &str = "config.toml";

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_USER_ID: &str = "default_user";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub api_version: String,
    pub user_id: String,
    pub default_model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Retry budget for idempotent fetches. Sends are never retried.
    pub max_retries: u32,
    pub http_proxy: String,
    pub https_proxy: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
            http_proxy: String::new(),
            https_proxy: String::new(),
        }
    }
}

impl Config {
    /// Load config from ~/.agentic-chat/config.json, falling back to
    /// ./config.toml, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_files(&config_json_path(), Path::new(CONFIG_FILE_PATH));
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// First readable file wins; unreadable or invalid files are skipped.
    pub fn from_files(json_path: &Path, toml_path: &Path) -> Self {
        if json_path.exists() {
            match Self::from_json_file(json_path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring {}: {}", json_path.display(), e),
            }
        }
        if toml_path.exists() {
            match Self::from_toml_file(toml_path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring {}: {}", toml_path.display(), e),
            }
        }
        Self::default()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override fields from environment-style variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = lookup("API_VERSION") {
            self.api_version = v;
        }
        if let Some(v) = lookup("CHAT_USER_ID") {
            self.user_id = v;
        }
        if let Some(v) = lookup("MODEL") {
            self.default_model = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("HTTP_PROXY") {
            self.http_proxy = v;
        }
        if let Some(v) = lookup("HTTPS_PROXY") {
            self.https_proxy = v;
        }
        if let Some(v) = lookup("CHAT_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.timeout_secs = v;
        }
        if let Some(v) = lookup("CHAT_MAX_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.max_retries = v;
        }
    }

    /// Versioned REST root, e.g. `http://localhost:8000/api/v1`.
    pub fn api_url(&self) -> String {
        format!(
            "{}/api/{}",
            self.api_base.trim_end_matches('/'),
            self.api_version
        )
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_api_url_trims_slash() {
        let config = Config {
            api_base: "http://example.test/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.api_url(), "http://example.test/api/v1");
    }

    #[test]
    fn test_json_takes_precedence_over_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("config.json");
        let toml_path = dir.path().join("config.toml");
        std::fs::write(&json, r#"{"api_base": "http://json.test"}"#).unwrap();
        std::fs::write(&toml_path, "api_base = \"http://toml.test\"\n").unwrap();

        let config = Config::from_files(&json, &toml_path);
        assert_eq!(config.api_base, "http://json.test");
        assert_eq!(config.user_id, DEFAULT_USER_ID);
    }

    #[test]
    fn test_invalid_json_falls_back_to_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("config.json");
        let toml_path = dir.path().join("config.toml");
        std::fs::write(&json, "{not json").unwrap();
        std::fs::write(&toml_path, "default_model = \"gpt-4o-mini\"\nmax_retries = 1\n").unwrap();

        let config = Config::from_files(&json, &toml_path);
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_files(&dir.path().join("a.json"), &dir.path().join("b.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_BASE", "http://env.test"),
            ("CHAT_USER_ID", "alice"),
            ("CHAT_TIMEOUT_SECS", " 5 "),
            ("CHAT_MAX_RETRIES", "nope"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base, "http://env.test");
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_retries, 3);
    }
}
