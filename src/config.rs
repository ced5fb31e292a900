//! Configuration for the GradeGuard monitor.
//!
//! Settings are read once at startup; a running session never sees changes.

use crate::collector::KeySymbol;
use crate::core::frame::Resolution;
use crate::core::fusion::FusionSettings;
use crate::core::recorder::RecordingSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Object labels that raise an alert unless configured otherwise.
pub const DEFAULT_PROHIBITED_LABELS: [&str; 3] = ["cell phone", "person", "laptop"];

/// Main configuration for the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run the object detector on every Nth frame
    pub sample_interval: u64,

    /// Detection labels treated as prohibited objects
    pub prohibited_labels: Vec<String>,

    /// Incident clip format
    pub recording: RecordingConfig,

    /// Keys watched by the keyboard listener
    pub keys: KeyConfig,

    /// Audit log location
    pub log_path: PathBuf,

    /// Directory that receives incident clips
    pub recording_dir: PathBuf,

    /// Path for session statistics
    pub data_path: PathBuf,

    /// Consecutive detector failures before the operator is alerted
    pub detector_failure_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gradeguard");

        Self {
            sample_interval: 5,
            prohibited_labels: DEFAULT_PROHIBITED_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recording: RecordingConfig::default(),
            keys: KeyConfig::default(),
            log_path: data_dir.join("suspicious_activity_log.csv"),
            recording_dir: data_dir.join("recordings"),
            data_path: data_dir,
            detector_failure_threshold: 3,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gradeguard")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.recording_dir)?;
        std::fs::create_dir_all(&self.data_path)?;
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval must be at least 1".to_string(),
            ));
        }
        if self.prohibited_labels.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "prohibited_labels must name at least one label".to_string(),
            ));
        }
        if self.recording.width == 0 || self.recording.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "recording resolution {}x{} is empty",
                self.recording.width, self.recording.height
            )));
        }
        if self.recording.frame_rate.is_nan() || self.recording.frame_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "recording frame_rate must be positive".to_string(),
            ));
        }
        if self.keys.quit == self.keys.tab {
            return Err(ConfigError::Invalid(format!(
                "quit and tab keys are both {}",
                self.keys.quit
            )));
        }
        Ok(())
    }

    pub fn fusion_settings(&self) -> FusionSettings {
        FusionSettings {
            sample_interval: self.sample_interval,
            prohibited_labels: self
                .prohibited_labels
                .iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            detector_failure_threshold: self.detector_failure_threshold,
        }
    }

    pub fn recording_settings(&self) -> RecordingSettings {
        RecordingSettings {
            output_dir: self.recording_dir.clone(),
            resolution: Resolution::new(self.recording.width, self.recording.height),
            frame_rate: self.recording.frame_rate,
        }
    }
}

/// Target format of incident clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 20.0,
        }
    }
}

/// Keys with a meaning to the keyboard listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Logs and ends the session
    pub quit: KeySymbol,
    /// Logs only
    pub tab: KeySymbol,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            quit: KeySymbol::Char('q'),
            tab: KeySymbol::TAB,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
