//! Daemon Configuration
//!
//! Configuration management for the camera bridge daemon.

use anyhow::{Context, Result};
use camerax_protocol::simulated::{SimulatedCameraConfig, SimulatedCameraSpec};
use camerax_protocol::CameraXConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bridge tunables
    #[serde(default)]
    pub plugin: CameraXConfig,

    /// Simulated device the bridge runs against
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Logging defaults, overridden by command-line flags
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Simulated device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Display rotation at startup, in quarter turns
    #[serde(default)]
    pub initial_quarter_turns: u8,

    /// Whether the camera permission starts out granted
    #[serde(default = "default_true")]
    pub permission_granted: bool,

    /// Cameras exposed by the simulated provider
    #[serde(default = "default_cameras")]
    pub cameras: Vec<SimulatedCameraSpec>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON structured logs
    #[serde(default)]
    pub json: bool,

    /// Show timestamps in logs
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cameras() -> Vec<SimulatedCameraSpec> {
    SimulatedCameraConfig::default().cameras
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_quarter_turns: 0,
            permission_granted: true,
            cameras: default_cameras(),
        }
    }
}

impl SimulatorConfig {
    pub fn camera_config(&self) -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            cameras: self.cameras.clone(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            timestamps: true,
        }
    }
}

impl Config {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("camerax")
            .join("daemon.toml")
    }

    /// Load configuration from `path` (or the default location), creating a
    /// default file if none exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.plugin.orientation_poll_interval(),
            Duration::from_millis(100)
        );
        assert_eq!(config.plugin.permission_request_code, 3543);
        assert!(config.simulator.permission_granted);
        assert_eq!(config.simulator.cameras.len(), 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.plugin, config.plugin);
        assert_eq!(parsed.simulator.cameras, config.simulator.cameras);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [plugin]
            orientation_poll_interval_ms = 250

            [simulator]
            permission_granted = false
            "#,
        )
        .unwrap();

        assert_eq!(parsed.plugin.orientation_poll_interval_ms, 250);
        assert_eq!(parsed.plugin.permission_request_code, 3543);
        assert!(!parsed.simulator.permission_granted);
        assert_eq!(parsed.simulator.cameras.len(), 2);
        assert!(parsed.logging.timestamps);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("daemon.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.plugin, CameraXConfig::default());
    }

    #[test]
    fn test_load_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.toml");

        let mut config = Config::default();
        config.simulator.initial_quarter_turns = 3;
        config.logging.json = true;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.simulator.initial_quarter_turns, 3);
        assert!(loaded.logging.json);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.toml");
        fs::write(&path, "plugin = 7").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }
}
