//! Configuration management for huemirror
//!
//! Provides loading, saving, environment layering and validation for camera,
//! detection, sync, bulb and presentation settings.

use crate::errors::ConfigError;
use crate::types::CaptureConstraints;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `HUEMIRROR__SYNC__AUTO_INTERVAL_MS=5000`
pub const ENV_PREFIX: &str = "HUEMIRROR";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub sync: SyncConfig,
    pub bulb: BulbConfig,
    pub presentation: PresentationConfig,
}

/// Camera acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Requested frame width
    pub ideal_width: u32,
    /// Requested frame height
    pub ideal_height: u32,
    /// Delay before re-acquiring a terminated stream, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Device selected at startup when present
    pub preferred_device: Option<String>,
}

/// Detection loop and extractor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Pause between detection cycles, in milliseconds
    pub frame_interval_ms: u64,
    /// Side of the centered square averaged by the fallback
    pub fallback_region: u32,
    /// Bits kept per channel when building the color histogram (1-8)
    pub histogram_bits: u8,
    /// Only every n-th pixel feeds the histogram
    pub sample_stride: u32,
}

/// Sync scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Auto-mode cadence, in milliseconds
    pub auto_interval_ms: u64,
    /// Upper bound on a single bulb request, in milliseconds
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulbMode {
    /// POST to the color backend's `/api/color`
    Backend,
    /// Talk to a Shelly bulb directly
    Shelly,
}

/// Bulb endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulbConfig {
    pub mode: BulbMode,
    /// Base URL of the color backend
    pub endpoint: String,
    /// Host or IP of the bulb in shelly mode
    pub shelly_host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// How long a status message stays visible, in milliseconds
    pub status_hide_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            reconnect_delay_ms: 2000,
            preferred_device: None,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            fallback_region: 100,
            histogram_bits: 5,
            sample_stride: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_interval_ms: 3000,
            request_timeout_ms: 5000,
        }
    }
}

impl Default for BulbConfig {
    fn default() -> Self {
        Self {
            mode: BulbMode::Backend,
            endpoint: "http://localhost:8080".to_string(),
            shelly_host: None,
        }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            status_hide_ms: 5000,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            sync: SyncConfig::default(),
            bulb: BulbConfig::default(),
            presentation: PresentationConfig::default(),
        }
    }
}

impl CameraConfig {
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl DetectionConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl SyncConfig {
    pub fn auto_interval(&self) -> Duration {
        Duration::from_millis(self.auto_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PresentationConfig {
    pub fn status_hide(&self) -> Duration {
        Duration::from_millis(self.status_hide_ms)
    }
}

impl MirrorConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config: MirrorConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the TOML file (if any) with `HUEMIRROR__SECTION__KEY` environment overrides on top
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let layered = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Read(e.to_string()))?;

        let config: MirrorConfig = layered
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Write(e.to_string()))?;
        fs::write(path, toml_string).map_err(|e| ConfigError::Write(e.to_string()))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("huemirror.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.camera.ideal_width == 0 || self.camera.ideal_height == 0 {
            return invalid("Ideal resolution must be non-zero");
        }
        if self.camera.reconnect_delay_ms == 0 {
            return invalid("Reconnect delay must be non-zero");
        }

        if self.detection.frame_interval_ms == 0 {
            return invalid("Frame interval must be non-zero");
        }
        if self.detection.fallback_region == 0 {
            return invalid("Fallback region must be non-zero");
        }
        if !(1..=8).contains(&self.detection.histogram_bits) {
            return invalid("Histogram bits must be between 1 and 8");
        }
        if self.detection.sample_stride == 0 {
            return invalid("Sample stride must be non-zero");
        }

        if self.sync.auto_interval_ms == 0 {
            return invalid("Auto interval must be non-zero");
        }
        if self.sync.request_timeout_ms == 0 {
            return invalid("Request timeout must be non-zero");
        }

        match self.bulb.mode {
            BulbMode::Backend if self.bulb.endpoint.trim().is_empty() => {
                return invalid("Bulb endpoint is required in backend mode");
            }
            BulbMode::Shelly
                if self
                    .bulb
                    .shelly_host
                    .as_deref()
                    .map_or(true, |h| h.trim().is_empty()) =>
            {
                return invalid("Shelly host is required in shelly mode");
            }
            _ => {}
        }

        Ok(())
    }
}
