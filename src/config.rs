//! Runtime configuration
//!
//! Sources, lowest priority first:
//! 1. `~/.config/lms-notify/config.json`
//! 2. `LMS_NOTIFY_*` environment variables
//! 3. CLI flags (applied by the caller)

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::notification::{EngineConfig, Role, DEFAULT_FEED_CAP, DEFAULT_FETCH_TIMEOUT};
use crate::store::FileStore;

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
/// How often preferences are re-read to notice writes from other processes
pub const DEFAULT_PREFS_REFRESH_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend origin, e.g. `https://lms.example.sch.id`
    pub base_url: Option<String>,
    /// Bearer token for the backend
    pub token: Option<String>,
    /// Namespace for persisted state
    pub user: Option<String>,
    pub role: Option<Role>,
    pub interval_secs: u64,
    pub prefs_refresh_secs: u64,
    pub feed_cap: usize,
    pub fetch_timeout_ms: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            user: None,
            role: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            prefs_refresh_secs: DEFAULT_PREFS_REFRESH_SECS,
            feed_cap: DEFAULT_FEED_CAP,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("lms-notify")
            .join("config.json")
    }

    /// Config file, then environment
    pub fn auto_load() -> Result<Self> {
        let mut config = Self::load_file(&Self::path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Missing file reads as defaults; a malformed file is an error
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Override from `LMS_NOTIFY_*` variables. Empty values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| {
            var(&format!("LMS_NOTIFY_{}", name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = get("TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = get("USER") {
            self.user = Some(v);
        }
        if let Some(v) = get("ROLE") {
            self.role = Some(v.parse()?);
        }
        if let Some(v) = get("INTERVAL_SECS") {
            self.interval_secs = parse_number("LMS_NOTIFY_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("FEED_CAP") {
            self.feed_cap = parse_number("LMS_NOTIFY_FEED_CAP", &v)?;
        }
        if let Some(v) = get("FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_number("LMS_NOTIFY_FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn user(&self) -> Result<&str> {
        self.user
            .as_deref()
            .ok_or_else(|| anyhow!("no user configured (set LMS_NOTIFY_USER or pass --user)"))
    }

    pub fn role(&self) -> Result<Role> {
        self.role
            .ok_or_else(|| anyhow!("no role configured (set LMS_NOTIFY_ROLE or pass --role)"))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn prefs_refresh(&self) -> Duration {
        Duration::from_secs(self.prefs_refresh_secs.max(1))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(FileStore::default_dir)
    }

    pub fn engine(&self) -> EngineConfig {
        let feed_cap = if self.feed_cap == 0 {
            warn!("feed_cap of 0 would hide every notification, using default");
            DEFAULT_FEED_CAP
        } else {
            self.feed_cap
        };
        EngineConfig {
            feed_cap,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms.max(1)),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("{} must be a non-negative integer, got {:?}", name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.engine().feed_cap, 50);
        assert_eq!(config.engine().fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_and_env_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"base_url":"http://file","role":"teacher","feed_cap":80}"#,
        )
        .unwrap();

        let mut config = Config::load_file(&path).unwrap();
        assert_eq!(config.interval_secs, DEFAULT_INTERVAL_SECS);

        let env: HashMap<&str, &str> = [
            ("LMS_NOTIFY_BASE_URL", "http://env"),
            ("LMS_NOTIFY_USER", "guru-1"),
            ("LMS_NOTIFY_TOKEN", "  "),
            ("LMS_NOTIFY_INTERVAL_SECS", "15"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("http://env"));
        assert_eq!(config.user().unwrap(), "guru-1");
        assert_eq!(config.role().unwrap(), Role::Teacher);
        assert!(config.token.is_none());
        assert_eq!(config.interval(), Duration::from_secs(15));
        assert_eq!(config.engine().feed_cap, 80);
    }

    #[test]
    fn test_bad_env_values_are_errors() {
        let mut config = Config::default();
        assert!(config
            .apply_env(|k| (k == "LMS_NOTIFY_FEED_CAP").then(|| "many".to_string()))
            .is_err());
        assert!(config
            .apply_env(|k| (k == "LMS_NOTIFY_ROLE").then(|| "parent".to_string()))
            .is_err());
    }

    #[test]
    fn test_missing_identity_is_reported() {
        let config = Config::default();
        assert!(config.user().is_err());
        assert!(config.role().is_err());
    }
}
