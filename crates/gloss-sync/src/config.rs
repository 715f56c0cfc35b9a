//! # Sync Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GLOSS_SYNC_MODE=manual                                             │
//! │     GLOSS_DEVICE_ID=abc-123                                            │
//! │     GLOSS_REMOTE_URL=https://sync.example.com                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/gloss-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.gloss.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, auto-generated device id                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Front Counter"
//!
//! [sync]
//! mode = "auto"  # auto | manual | offline
//! remote_url = "https://sync.example.com"
//! batch_size = 100
//! poll_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// When the engine runs a cycle.
///
/// ```text
/// AUTO     every poll interval, plus on demand
/// MANUAL   only when triggered (sync button, after checkout)
/// OFFLINE  never; the outbox keeps growing until the mode changes
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Offline,
}

impl SyncMode {
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }

    pub fn polls(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" | "on_demand" => Ok(SyncMode::Manual),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Generated on first run when absent.
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Register".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Base URL of the remote store. Not needed for in-process remotes.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Outbox entries read per upload round.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Remote changes requested per pull page.
    #[serde(default = "default_pull_page_size")]
    pub pull_page_size: u32,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Synced outbox entries older than this are deleted after a cycle.
    /// 0 keeps them forever.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_after_days: u32,
}

fn default_batch_size() -> u32 {
    100
}
fn default_pull_page_size() -> u32 {
    200
}
fn default_poll_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_cleanup_days() -> u32 {
    7
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            remote_url: None,
            batch_size: default_batch_size(),
            pull_page_size: default_pull_page_size(),
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            cleanup_after_days: default_cleanup_days(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(raw) = &self.sync.remote_url {
            let url = Url::parse(raw)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must use http or https, got: {}",
                    raw
                )));
            }
        }

        if self.sync.batch_size == 0 || self.sync.pull_page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size and pull_page_size must be greater than 0".into(),
            ));
        }

        if self.sync.mode.polls() && self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0 in auto mode".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("GLOSS_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("GLOSS_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(mode) = std::env::var("GLOSS_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Ok(url) = std::env::var("GLOSS_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.sync.remote_url = Some(url);
        }

        if let Ok(secs) = std::env::var("GLOSS_SYNC_INTERVAL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.sync.poll_interval_secs = s;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "gloss", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs.max(1))
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.sync.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.sync.max_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("Manual".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("disabled".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.mode(), SyncMode::Auto);
        assert_eq!(config.sync.batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.device.id = "  ".to_string();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));

        config.device.id = "register-1".to_string();
        config.sync.remote_url = Some("ftp://sync.example.com".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.sync.remote_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.sync.remote_url = Some("https://sync.example.com/api".to_string());
        assert!(config.validate().is_ok());

        config.sync.batch_size = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [device]
            id = "register-1"

            [sync]
            mode = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.name, "Register");
        assert_eq!(config.mode(), SyncMode::Manual);
        assert_eq!(config.sync.pull_page_size, 200);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("gloss-sync-{}", Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::default();
        config.device.name = "Bay Tablet".to_string();
        config.sync.mode = SyncMode::Manual;
        config.save(Some(path.clone())).unwrap();

        let loaded: SyncConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.device.id, config.device.id);
        assert_eq!(loaded.device.name, "Bay Tablet");
        assert_eq!(loaded.mode(), SyncMode::Manual);

        let _ = std::fs::remove_dir_all(dir);
    }
}
