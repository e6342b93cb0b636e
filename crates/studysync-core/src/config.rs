//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/studysync/config.toml)
//! 3. Environment variables (STUDYSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::{DocumentLayout, DEFAULT_DESCRIPTION, DEFAULT_FILENAME};

/// Environment variable prefix
const ENV_PREFIX: &str = "STUDYSYNC";

const DEFAULT_API_URL: &str = "https://api.github.com";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local state (progress, sync binding)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the document store API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Marker identifying this app's document among the user's documents
    #[serde(default = "default_document_description")]
    pub document_description: String,

    /// File inside the document holding the snapshot
    #[serde(default = "default_document_filename")]
    pub document_filename: String,

    /// Extra wait after the advertised rate limit reset
    #[serde(default = "default_rate_limit_buffer_secs")]
    pub rate_limit_buffer_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause before re-listing documents ahead of a create
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,

    /// Sync after every local change
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,

    /// Log file path (used when STUDYSYNC_LOG is set)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            document_description: default_document_description(),
            document_filename: default_document_filename(),
            rate_limit_buffer_secs: default_rate_limit_buffer_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            recheck_delay_ms: default_recheck_delay_ms(),
            auto_sync: default_auto_sync(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (STUDYSYNC_DATA_DIR, STUDYSYNC_API_URL, ...)
    /// 2. Config file (~/.config/studysync/config.toml or STUDYSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit `--config` path
    pub fn load_with_cli_override(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string restores the default endpoint
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            self.api_url = if val.is_empty() { default_api_url() } else { val };
        }

        if let Ok(val) = std::env::var(format!("{}_AUTO_SYNC", ENV_PREFIX)) {
            self.auto_sync = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() { None } else { Some(val.into()) };
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with STUDYSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("studysync")
            .join("config.toml")
    }

    /// Path of the local key-value state file
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn document_layout(&self) -> DocumentLayout {
        DocumentLayout {
            description: self.document_description.clone(),
            filename: self.document_filename.clone(),
        }
    }

    pub fn rate_limit_buffer(&self) -> Duration {
        Duration::from_secs(self.rate_limit_buffer_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("studysync")
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_document_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

fn default_document_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

fn default_rate_limit_buffer_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_recheck_delay_ms() -> u64 {
    1500
}

fn default_auto_sync() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "STUDYSYNC_DATA_DIR",
        "STUDYSYNC_API_URL",
        "STUDYSYNC_AUTO_SYNC",
        "STUDYSYNC_LOG_FILE",
        "STUDYSYNC_CONFIG",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.document_filename, "progress.json");
        assert_eq!(config.rate_limit_buffer(), Duration::from_secs(30));
        assert_eq!(config.recheck_delay(), Duration::from_millis(1500));
        assert!(config.auto_sync);
        assert!(config.log_file.is_none());
        assert!(config.data_dir.ends_with("studysync"));
    }

    #[test]
    fn test_state_path_and_layout() {
        let config = Config {
            data_dir: PathBuf::from("/data/studysync"),
            document_description: "my marker".to_string(),
            ..Config::default()
        };

        assert_eq!(
            config.state_path(),
            PathBuf::from("/data/studysync/state.json")
        );
        let layout = config.document_layout();
        assert_eq!(layout.description, "my marker");
        assert_eq!(layout.filename, "progress.json");
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STUDYSYNC_DATA_DIR", "/tmp/studysync-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/studysync-test"));
    }

    #[test]
    fn test_env_override_auto_sync() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("STUDYSYNC_AUTO_SYNC", "false");
        config.apply_env_overrides();
        assert!(!config.auto_sync);

        env::set_var("STUDYSYNC_AUTO_SYNC", "1");
        config.apply_env_overrides();
        assert!(config.auto_sync);
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("STUDYSYNC_API_URL", "http://localhost:8080");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "http://localhost:8080");

        // Empty string restores the default
        env::set_var("STUDYSYNC_API_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_env_override_log_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("STUDYSYNC_LOG_FILE", "/tmp/studysync.log");
        config.apply_env_overrides();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/studysync.log")));

        env::set_var("STUDYSYNC_LOG_FILE", "");
        config.apply_env_overrides();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_load_from_str_partial() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            recheck_delay_ms = 0
            auto_sync = false
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.recheck_delay(), Duration::ZERO);
        assert!(!config.auto_sync);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let config = Config {
            data_dir: temp.path().join("data"),
            api_url: "http://127.0.0.1:9000".to_string(),
            log_file: Some(temp.path().join("studysync.log")),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded.data_dir, config.data_dir);
        assert_eq!(loaded.api_url, config.api_url);
        assert_eq!(loaded.log_file, config.log_file);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = TempDir::new().unwrap();
        env::set_var("STUDYSYNC_DATA_DIR", temp.path().join("data"));

        let config = Config::load_from_path(&temp.path().join("missing.toml")).unwrap();

        assert!(config.auto_sync);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_config_file_path_env_override() {
        let _guard = EnvGuard::new(ENV_VARS);

        env::set_var("STUDYSYNC_CONFIG", "/etc/studysync.toml");
        assert_eq!(
            Config::config_file_path(),
            PathBuf::from("/etc/studysync.toml")
        );
    }
}
