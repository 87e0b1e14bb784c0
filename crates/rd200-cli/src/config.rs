//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rd200_core::SessionConfig;
use serde::{Deserialize, Serialize};

/// Default seconds between polls in watch mode.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device address
    #[serde(default)]
    pub device: Option<String>,

    /// Advertised name of the default device
    #[serde(default)]
    pub name: Option<String>,

    /// Use Bq/m³ for radon (instead of pCi/L)
    #[serde(default)]
    pub bq: bool,

    /// Seconds between polls in watch mode
    #[serde(default)]
    pub interval: Option<u64>,

    /// Session timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Per-command deadlines and connect timeout, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_command_timeout")]
    pub levels: u64,
    #[serde(default = "default_command_timeout")]
    pub peak: u64,
    #[serde(default = "default_command_timeout")]
    pub uptime: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect: u64,
}

fn default_command_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    15
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            levels: default_command_timeout(),
            peak: default_command_timeout(),
            uptime: default_command_timeout(),
            connect: default_connect_timeout(),
        }
    }
}

impl TimeoutConfig {
    /// Session timeouts, with `connect_override` (seconds) taking precedence
    /// over the configured connect timeout.
    pub fn session_config(&self, connect_override: Option<u64>) -> SessionConfig {
        SessionConfig::new()
            .levels_deadline(Duration::from_secs(self.levels))
            .peak_deadline(Duration::from_secs(self.peak))
            .uptime_deadline(Duration::from_secs(self.uptime))
            .connect_timeout(Duration::from_secs(connect_override.unwrap_or(self.connect)))
    }
}

impl Config {
    /// Get config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rd200")
            .join("config.toml")
    }

    /// Load config from the default path, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Set a value by key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let seconds = || -> Result<u64> {
            let secs: u64 = value
                .parse()
                .with_context(|| format!("'{}' is not a number of seconds", value))?;
            if secs == 0 {
                bail!("{} must be greater than zero", key);
            }
            Ok(secs)
        };

        match key {
            "device" => self.device = Some(value.to_string()),
            "name" => self.name = Some(value.to_string()),
            "bq" => {
                self.bq = value
                    .parse()
                    .with_context(|| format!("'{}' is not true or false", value))?
            }
            "interval" => self.interval = Some(seconds()?),
            "timeouts.levels" => self.timeouts.levels = seconds()?,
            "timeouts.peak" => self.timeouts.peak = seconds()?,
            "timeouts.uptime" => self.timeouts.uptime = seconds()?,
            "timeouts.connect" => self.timeouts.connect = seconds()?,
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Reset a value by key.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        let defaults = TimeoutConfig::default();
        match key {
            "device" => self.device = None,
            "name" => self.name = None,
            "bq" => self.bq = false,
            "interval" => self.interval = None,
            "timeouts.levels" => self.timeouts.levels = defaults.levels,
            "timeouts.peak" => self.timeouts.peak = defaults.peak,
            "timeouts.uptime" => self.timeouts.uptime = defaults.uptime,
            "timeouts.connect" => self.timeouts.connect = defaults.connect,
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }
}

/// Resolve device from command-line arg or config default
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

/// Resolve the advertised name for `device`.
///
/// The configured name is only used when `device` is the configured device.
pub fn resolve_name(name: Option<String>, device: Option<&str>, config: &Config) -> Option<String> {
    name.or_else(|| match (device, config.device.as_deref()) {
        (Some(device), Some(configured)) if device.eq_ignore_ascii_case(configured) => {
            config.name.clone()
        }
        _ => None,
    })
}

/// Resolve the watch interval: CLI arg, then config, then default.
pub fn resolve_interval(interval: Option<u64>, config: &Config) -> u64 {
    interval
        .or(config.interval)
        .unwrap_or(DEFAULT_INTERVAL_SECS)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.device.is_none());
        assert!(!config.bq);
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            device = "AA:BB:CC:DD:EE:FF"
            bq = true

            [timeouts]
            uptime = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(config.bq);
        assert_eq!(config.timeouts.uptime, 10);
        assert_eq!(config.timeouts.levels, 5);
        assert_eq!(config.timeouts.connect, 15);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("device", "AA:BB:CC:DD:EE:FF").unwrap();
        config.set("name", "FR:RD-0001").unwrap();
        config.set("interval", "60").unwrap();
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_load_invalid_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "device = [not toml").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("timeouts.peak", "0").is_err());
        assert!(config.set("timeouts.peak", "soon").is_err());
        assert!(config.set("bq", "maybe").is_err());
        assert!(config.set("colour", "red").is_err());
    }

    #[test]
    fn test_unset_restores_defaults() {
        let mut config = Config::default();
        config.set("timeouts.connect", "30").unwrap();
        config.unset("timeouts.connect").unwrap();
        assert_eq!(config.timeouts.connect, 15);
    }

    #[test]
    fn test_session_config_from_timeouts() {
        let timeouts = TimeoutConfig {
            uptime: 10,
            ..TimeoutConfig::default()
        };
        let session = timeouts.session_config(Some(30));
        assert_eq!(session.uptime_deadline, Duration::from_secs(10));
        assert_eq!(session.levels_deadline, Duration::from_secs(5));
        assert_eq!(session.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_resolve_name_only_for_configured_device() {
        let config = Config {
            device: Some("AA:BB".to_string()),
            name: Some("FR:RD-1".to_string()),
            ..Config::default()
        };
        assert_eq!(
            resolve_name(None, Some("aa:bb"), &config).as_deref(),
            Some("FR:RD-1")
        );
        assert_eq!(resolve_name(None, Some("CC:DD"), &config), None);
        assert_eq!(
            resolve_name(Some("FR:R2-9".to_string()), Some("CC:DD"), &config).as_deref(),
            Some("FR:R2-9")
        );
    }

    #[test]
    fn test_resolve_interval() {
        let config = Config {
            interval: Some(60),
            ..Config::default()
        };
        assert_eq!(resolve_interval(Some(10), &config), 10);
        assert_eq!(resolve_interval(None, &config), 60);
        assert_eq!(resolve_interval(None, &Config::default()), DEFAULT_INTERVAL_SECS);
    }
}
