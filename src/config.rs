use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::retry::RetryPolicy;

const DEFAULT_SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sync.playlist_prefix is required and must not be empty")]
    MissingPlaylistPrefix,
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("target.api_base is not a valid URL: {0}")]
    InvalidApiBase(String),
    #[error(
        "no Spotify access token configured; set target.access_token or SPOTIFY_ACCESS_TOKEN"
    )]
    MissingAccessToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub target: TargetConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub follow: FollowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub library_path: String,
    #[serde(default)]
    pub ignore_playlists: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            api_base: default_api_base(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub playlist_prefix: String,
    #[serde(default = "default_separator")]
    pub playlist_separator: String,
    #[serde(default)]
    pub exclude_from_playlist_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_candidates_shown")]
    pub max_candidates_shown: usize,
    #[serde(default)]
    pub cache_path: Option<String>,
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_candidates_shown: default_max_candidates_shown(),
            cache_path: None,
            save_every: default_save_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_follow_threshold")]
    pub threshold: usize,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_follow_threshold(),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_SPOTIFY_API_BASE.to_string()
}
fn default_requests_per_second() -> u32 {
    5
}
fn default_separator() -> String {
    " ".to_string()
}
fn default_concurrency() -> usize {
    4
}
fn default_max_candidates_shown() -> usize {
    10
}
fn default_save_every() -> usize {
    25
}
fn default_max_attempts() -> usize {
    4
}
fn default_min_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8000
}
fn default_follow_threshold() -> usize {
    3
}

const DEFAULT_CONFIG: &str = r#"# crate-mirror configuration

[source]
# JSON export of the source library
library_path = "~/Music/library.json"
ignore_playlists = []

[target]
# Falls back to the SPOTIFY_ACCESS_TOKEN environment variable
# access_token = ""
requests_per_second = 5

[sync]
# Only target playlists starting with this prefix are ever modified
playlist_prefix = "rb"
playlist_separator = " "
exclude_from_playlist_names = []

[matching]
concurrency = 4
max_candidates_shown = 10
save_every = 25

[retry]
max_attempts = 4
min_delay_ms = 500
max_delay_ms = 8000

[follow]
enabled = false
threshold = 3
"#;

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .wrap_err_with(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).wrap_err("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("crate-mirror").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path =
            Self::config_path().ok_or(color_eyre::eyre::eyre!("Config directory not found"))?;

        Self::from_file(&config_path)
    }

    /// Write the default config file unless one already exists.
    pub fn create_default() -> Result<PathBuf> {
        let config_path =
            Self::config_path().ok_or(color_eyre::eyre::eyre!("Config directory not found"))?;
        Self::write_default_to(&config_path)?;
        Ok(config_path)
    }

    fn write_default_to(path: &Path) -> Result<()> {
        if path.exists() {
            log::info!("Config already exists at {}", path.display());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, DEFAULT_CONFIG)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.playlist_prefix.trim().is_empty() {
            return Err(ConfigError::MissingPlaylistPrefix);
        }
        if self.matching.concurrency == 0 {
            return Err(ConfigError::NotPositive {
                field: "matching.concurrency",
            });
        }
        if self.matching.save_every == 0 {
            return Err(ConfigError::NotPositive {
                field: "matching.save_every",
            });
        }
        if self.target.requests_per_second == 0 {
            return Err(ConfigError::NotPositive {
                field: "target.requests_per_second",
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NotPositive {
                field: "retry.max_attempts",
            });
        }
        if self.follow.threshold == 0 {
            return Err(ConfigError::NotPositive {
                field: "follow.threshold",
            });
        }
        Url::parse(&self.target.api_base)
            .map_err(|e| ConfigError::InvalidApiBase(e.to_string()))?;
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn library_path(&self) -> PathBuf {
        self.expand_path(&self.source.library_path)
    }

    /// Mapping cache location: explicit path, or next to the default config file.
    pub fn cache_path(&self) -> PathBuf {
        if let Some(ref path) = self.matching.cache_path {
            return self.expand_path(path);
        }
        Self::config_path()
            .and_then(|p| p.parent().map(|dir| dir.join("mapping_cache.json")))
            .unwrap_or_else(|| PathBuf::from("mapping_cache.json"))
    }

    /// Access token from config or the environment.
    pub fn access_token(&self) -> Result<String, ConfigError> {
        self.target
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("SPOTIFY_ACCESS_TOKEN").ok())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingAccessToken)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            min_delay: Duration::from_millis(self.retry.min_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}
