//! Application configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the API base URL and the last used username.
//!
//! Configuration is stored at `~/.config/mealcache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::utils::url::UrlResolver;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "mealcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default server address for a self-hosted household instance
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8081/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the on-disk key-value store.
    pub fn store_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// URL resolver for the configured base API URL.
    pub fn url_resolver(&self) -> UrlResolver {
        UrlResolver::new(&self.api_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_resolves_urls() {
        let config = Config::default();
        let urls = config.url_resolver();
        assert_eq!(urls.origin(), "http://127.0.0.1:8081");
        assert_eq!(urls.api_url("/meals"), "http://127.0.0.1:8081/api/meals");
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = Config {
            api_base_url: "https://meals.example.com/api".to_string(),
            last_username: Some("mom".to_string()),
        };
        let text = serde_json::to_string(&config).expect("serialize");
        let parsed: Config = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed.api_base_url, config.api_base_url);
        assert_eq!(parsed.last_username.as_deref(), Some("mom"));
    }
}
