//! JSON configuration for the calibration driver.
//!
//! Every section has defaults, so a partial file (or `{}`) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CameraConfig;
use crate::settings::{CalibrationSettings, SettingsError};
use crate::targets::{TargetError, TargetLayout, TargetSequence};
use crate::transport::OverflowPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<SettingsError> for ConfigError {
    fn from(e: SettingsError) -> Self {
        ConfigError::Invalid(format!("calibration: {e}"))
    }
}

impl From<TargetError> for ConfigError {
    fn from(e: TargetError) -> Self {
        ConfigError::Invalid(format!("targets: {e}"))
    }
}

/// Network settings for the engine relay link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Local address to bind, port 0 for any
    pub bind_addr: String,
    /// Relay address datagrams are sent to
    pub remote_addr: String,
    pub send_timeout_ms: u64,
    /// Inbound datagrams buffered between ticks
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            remote_addr: "127.0.0.1:50021".to_string(),
            send_timeout_ms: 100,
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl ConnectionConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub calibration: CalibrationSettings,
    pub targets: TargetLayout,
    pub camera: CameraConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save configuration as pretty-printed JSON, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;
        TargetSequence::from_layout(&self.targets)?;

        if self.connection.send_timeout_ms == 0 {
            // A zero write timeout is rejected by the socket layer
            return Err(ConfigError::Invalid(
                "connection.send_timeout_ms must be positive".to_string(),
            ));
        }
        if self.connection.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "connection.queue_capacity must be positive".to_string(),
            ));
        }

        let camera = &self.camera;
        if !(camera.vertical_fov_deg > 0.0 && camera.vertical_fov_deg < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.vertical_fov_deg must be in (0, 180), got {}",
                camera.vertical_fov_deg
            )));
        }
        if !(camera.aspect.is_finite() && camera.aspect > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.aspect must be positive, got {}",
                camera.aspect
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CalibrationMode;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("hmd.json");

        let mut config = AppConfig::default();
        config.connection.remote_addr = "10.0.0.5:50021".to_string();
        config.connection.overflow = OverflowPolicy::DropNewest;
        config.calibration.mode = CalibrationMode::ThreeD;
        config.targets = TargetLayout::Grid {
            size: 3,
            spacing: 0.2,
            depth: 1.5,
        };

        config.save_to_file(&path).unwrap();
        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.json");
        std::fs::write(
            &path,
            r#"{"connection": {"remote_addr": "192.168.1.20:50021"}, "camera": {"aspect": 1.0}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.connection.remote_addr, "192.168.1.20:50021");
        assert_eq!(config.connection.queue_capacity, 256);
        assert_eq!(config.camera.aspect, 1.0);
        assert_eq!(config.camera.vertical_fov_deg, 60.0);
        assert_eq!(config.calibration, CalibrationSettings::default());
        assert_eq!(config.targets, TargetLayout::default());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = AppConfig::load_from_file(&temp_dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_validate_rejects_bad_sections() {
        let mut config = AppConfig::default();
        config.calibration.samples_per_target = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.targets = TargetLayout::Explicit { points: vec![] };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // Targets at or behind the camera plane
        for targets in [
            TargetLayout::Explicit {
                points: vec![[0.0, 0.0, 1.0], [0.1, 0.0, 0.0]],
            },
            TargetLayout::Circle {
                points: 4,
                radius: 0.2,
                depth: -1.0,
                include_center: false,
            },
            TargetLayout::Grid {
                size: 2,
                spacing: 0.1,
                depth: f32::NAN,
            },
        ] {
            let config = AppConfig {
                targets,
                ..AppConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        let mut config = AppConfig::default();
        config.camera.vertical_fov_deg = 180.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.connection.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
