//! Configuration loading and data folder resolution
//!
//! Configuration resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`TTNLOG_CONFIG`)
//! 3. Platform config file (`~/.config/ttnlog/config.toml`, then `/etc/ttnlog/config.toml` on Linux)
//! 4. Compiled defaults (fallback)

use crate::code::LengthPolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "TTNLOG_CONFIG";

/// Service configuration, loaded from TOML.
///
/// Every field has a compiled default so a missing config file is not an
/// error; a present but malformed file is.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path. Defaults to `<data dir>/ttnlog.db`.
    pub database_path: Option<PathBuf>,

    /// Minimum digit count for an accepted code
    pub code_min_len: usize,
    /// Maximum digit count for an accepted code
    pub code_max_len: usize,

    /// Quiet period after the last scan before a submitter's buffer flushes
    pub debounce_secs: u64,
    /// Window within which an identical operator alert is not resent
    pub alert_cooldown_secs: u64,
    /// Interval between wholesale mirror rebuilds from the remote store
    pub resync_interval_secs: u64,
    /// Tick interval for the daily subscriber report check
    pub report_tick_secs: u64,

    /// Remote tabular store connection settings
    pub remote: RemoteConfig,
}

/// Remote tabular store connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the row-oriented table API
    pub base_url: String,
    /// Bearer token for the table API
    pub token: String,
    /// Per-request timeout; an elapsed timeout counts as a push failure
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            code_min_len: 10,
            code_max_len: 18,
            debounce_secs: 5,
            alert_cooldown_secs: 600,
            resync_interval_secs: 3600,
            report_tick_secs: 60,
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration following the resolution priority order.
    pub fn load(cli_arg: Option<&Path>) -> Result<Config> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            info!("Loading config from CLI argument: {}", path.display());
            return Self::from_file(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading config from {}: {}", CONFIG_ENV_VAR, path);
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: Platform config file
        if let Some(path) = find_config_file() {
            info!("Loading config file: {}", path.display());
            return Self::from_file(&path);
        }

        // Priority 4: Compiled defaults
        info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Parse a specific TOML config file.
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.code_min_len == 0 || self.code_min_len > self.code_max_len {
            return Err(Error::Config(format!(
                "Invalid code length window: {}-{}",
                self.code_min_len, self.code_max_len
            )));
        }
        Ok(())
    }

    /// Accepted code length window as a policy value.
    pub fn length_policy(&self) -> LengthPolicy {
        LengthPolicy {
            min_len: self.code_min_len,
            max_len: self.code_max_len,
        }
    }

    /// Resolved database path (configured value or platform default).
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("ttnlog.db"))
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn report_tick(&self) -> Duration {
        Duration::from_secs(self.report_tick_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

/// Locate the platform config file, if any.
fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("ttnlog").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ttnlog/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// OS-dependent default data folder
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("ttnlog"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ttnlog"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("ttnlog"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ttnlog"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("ttnlog"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ttnlog"))
    } else {
        PathBuf::from("./ttnlog_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_current_policy() {
        let config = Config::default();
        assert_eq!(config.code_min_len, 10);
        assert_eq!(config.code_max_len, 18);
        assert_eq!(config.debounce_secs, 5);
        assert_eq!(config.alert_cooldown_secs, 600);
        assert_eq!(config.resync_interval_secs, 3600);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "code_min_len = 8\n\n[remote]\nbase_url = \"http://sheets.local\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.code_min_len, 8);
        assert_eq!(config.code_max_len, 18);
        assert_eq!(config.remote.base_url, "http://sheets.local");
        assert_eq!(config.remote.timeout_secs, 30);
    }

    #[test]
    fn rejects_inverted_length_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "code_min_len = 20\ncode_max_len = 10\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
