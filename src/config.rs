//! Application configuration.
//!
//! Persistent settings live at `~/.config/dayly/config.json`; the API base
//! URL can be overridden per-environment with `DAYLY_API_URL` (read from
//! the environment or a `.env` file).

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache/data directory paths
const APP_NAME: &str = "dayly";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API base URL when neither config nor environment provide one
const DEFAULT_API_URL: &str = "https://api.dayly.app";

/// Environment variable overriding the API base URL
const API_URL_ENV: &str = "DAYLY_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Pick up a .env file if one is present; absence is fine.
        let _ = dotenvy::dotenv();

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

    /// Resolved API base URL: environment override, then config file,
    /// then the built-in default.
    pub fn api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for cached photo files.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir =
            dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("photos"))
    }

    /// Directory for the local database and session file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Path of the local SQLite database.
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("dayly.db"))
    }
}
