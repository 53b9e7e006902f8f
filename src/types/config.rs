//! Configuration for modindex.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ModIndexResult;

/// Default name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "modindex.toml";

/// Main configuration for modindex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Request cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the index API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout for a single request (in seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Game version mods are requested for.
    #[serde(default = "default_game_version")]
    pub game_version: String,

    /// Platform identifier sent to the server.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Loader version sent to the server.
    #[serde(default = "default_loader_version")]
    pub loader_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            game_version: default_game_version(),
            platform: default_platform(),
            loader_version: default_loader_version(),
        }
    }
}

impl ServerConfig {
    /// User agent sent with every request.
    pub fn user_agent(&self) -> String {
        format!(
            "modindex (ver={};platform={};gd={})",
            self.loader_version, self.platform, self.game_version
        )
    }

    /// Joins an endpoint path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_game_version() -> String {
    "2.206".to_string()
}

fn default_platform() -> String {
    match std::env::consts::OS {
        "windows" => "win",
        "macos" => "mac",
        "android" => "android64",
        "ios" => "ios",
        _ => "linux",
    }
    .to_string()
}

fn default_loader_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Request cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries per cache.
    #[serde(default = "default_size_limit")]
    pub size_limit: usize,

    /// Maximum number of IDs sent in one update check request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_limit: default_size_limit(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_size_limit() -> usize {
    20
}

fn default_max_batch_size() -> usize {
    200
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> ModIndexResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ModIndexResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates default configuration.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Tries to load configuration from current directory or uses default.
    pub fn load_or_default() -> Self {
        Self::load(CONFIG_FILE_NAME).unwrap_or_else(|_| Self::default_config())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default_config();
        assert_eq!(config.cache.size_limit, 20);
        assert_eq!(config.cache.max_batch_size, 200);
        assert_eq!(config.general.log_format, "text");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            size_limit = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.size_limit, 5);
        assert_eq!(config.cache.max_batch_size, 200);
        assert_eq!(config.server.timeout_secs, 30);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = Config::default_config();
        config.server.base_url = "https://index.test/v1".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.base_url, "https://index.test/v1");
    }

    #[test]
    fn test_url_join_ignores_trailing_slash() {
        let server = ServerConfig {
            base_url: "https://index.test/v1/".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(server.url("/mods"), "https://index.test/v1/mods");
    }

    #[test]
    fn test_user_agent_mentions_platform_and_game() {
        let server = ServerConfig {
            platform: "win".to_string(),
            game_version: "2.206".to_string(),
            loader_version: "1.0.0".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(
            server.user_agent(),
            "modindex (ver=1.0.0;platform=win;gd=2.206)"
        );
    }
}
