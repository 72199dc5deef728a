use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use dirs_next::{config_dir, data_dir};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
pub const PLAYER_ENV_KEY: &str = "ANVESHNA_PLAYER";

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub player: PlayerConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub command: String,
    /// Stream location for the primary player; `{episode_id}` is substituted.
    pub stream_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub no_episodes_grace_ms: u64,
    pub key_debounce_ms: u64,
    pub details_retries: u32,
}

impl WatchConfig {
    pub fn no_episodes_grace(&self) -> Duration {
        Duration::from_millis(self.no_episodes_grace_ms)
    }

    pub fn key_debounce(&self) -> Duration {
        Duration::from_millis(self.key_debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            no_episodes_grace_ms: 10_000,
            key_debounce_ms: 200,
            details_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Built-in defaults, then the user file, then `ANVESHNA__SECTION__KEY` variables.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path().as_deref())
    }

    pub fn load_from(user_file: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(path) = user_file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: AppConfig = builder
            .add_source(Environment::with_prefix("ANVESHNA").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|base| base.join("anveshna").join("config.toml"))
    }

    pub fn storage_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }
        let base = data_dir()
            .ok_or_else(|| Error::Storage("could not determine data directory".into()))?;
        Ok(base.join("anveshna").join("storage.json"))
    }

    /// Player command, `ANVESHNA_PLAYER` taking precedence over the config file.
    pub fn player_command(&self) -> String {
        std::env::var(PLAYER_ENV_KEY)
            .ok()
            .filter(|val| !val.trim().is_empty())
            .unwrap_or_else(|| self.player.command.clone())
    }
}
