//! Configuration for the streamer
//!
//! Every key is optional; a missing file section falls back to the built-in
//! defaults. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::streaming::{CaptureOptions, PipelineOptions};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub servo: ServoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraConfig {
    /// V4L2 device node
    #[serde(default = "default_device")]
    pub device: String,

    /// Pixel format fourcc, e.g. "YUYV". First supported format when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Frame size as "WxH". Largest available when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default = "default_frame_timeout")]
    pub frame_timeout_secs: u64,

    /// Log capture rate every 10 seconds
    #[serde(default)]
    pub report_fps: bool,

    /// Generate frames instead of opening a device
    #[serde(default)]
    pub test_pattern: bool,

    // Test pattern geometry. Ignored for real devices.
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            format: None,
            size: None,
            frame_timeout_secs: default_frame_timeout(),
            report_fps: false,
            test_pattern: false,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncoderConfig {
    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StreamConfig {
    /// Consumers served per frame
    #[serde(default = "default_max_waiters")]
    pub max_waiters: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_waiters: default_max_waiters(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory holding index.html and script.js
    #[serde(default = "default_site_dir")]
    pub site_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            site_dir: default_site_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServoConfig {
    /// Try to drive pan/tilt servos on PWM0/PWM1
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_device() -> String {
    "/dev/video0".to_string()
}
fn default_frame_timeout() -> u64 {
    5
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_quality() -> u8 {
    crate::streaming::encoder::DEFAULT_QUALITY
}
fn default_max_waiters() -> usize {
    crate::streaming::frame_distributor::DEFAULT_MAX_WAITERS
}
fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_site_dir() -> String {
    "site".to_string()
}
fn default_true() -> bool {
    true
}

/// Parses a "WxH" size string.
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.trim().split_once(['x', 'X'])?;
    let w = w.trim().parse().ok()?;
    let h = h.trim().parse().ok()?;
    Some((w, h))
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let quality = self.encoder.quality;
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::Invalid(format!(
                "JPEG quality must be between 1 and 100, got {}",
                quality
            )));
        }

        if self.stream.max_waiters == 0 {
            return Err(ConfigError::Invalid(
                "max-waiters must be at least 1".to_string(),
            ));
        }

        if self.camera.frame_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "frame-timeout-secs must be at least 1".to_string(),
            ));
        }

        if let Some(size) = &self.camera.size {
            match parse_size(size) {
                Some((w, h)) if w > 0 && h > 0 => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "size must look like 640x480, got {:?}",
                        size
                    )))
                }
            }
        }

        if self.camera.test_pattern {
            let cam = &self.camera;
            if cam.width < 2 || cam.height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "test pattern size {}x{} is too small",
                    cam.width, cam.height
                )));
            }
            if cam.fps == 0 || cam.fps > 120 {
                return Err(ConfigError::Invalid(format!(
                    "FPS must be between 1 and 120, got {}",
                    cam.fps
                )));
            }
        }

        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            capture: CaptureOptions {
                frame_timeout: Duration::from_secs(self.camera.frame_timeout_secs),
                report_fps: self.camera.report_fps,
            },
            quality: self.encoder.quality,
            max_waiters: self.stream.max_waiters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera.device, "/dev/video0");
        assert_eq!(config.camera.frame_timeout_secs, 5);
        assert_eq!(config.encoder.quality, 75);
        assert_eq!(config.stream.max_waiters, 50);
        assert_eq!(config.server.listen, "0.0.0.0:8000");
        assert!(config.servo.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.camera.format, None);
        assert_eq!(config.stream.max_waiters, 50);
    }

    #[test]
    fn test_parse_kebab_case() {
        let toml = r#"
[camera]
device = "/dev/video2"
format = "YUYV"
size = "1280x720"
frame-timeout-secs = 2
report-fps = true

[encoder]
quality = 90

[stream]
max-waiters = 8

[server]
listen = "127.0.0.1:9000"
site-dir = "/srv/site"

[servo]
enabled = false
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.camera.device, "/dev/video2");
        assert_eq!(config.camera.format.as_deref(), Some("YUYV"));
        assert_eq!(config.camera.size.as_deref(), Some("1280x720"));
        assert!(config.camera.report_fps);
        assert_eq!(config.encoder.quality, 90);
        assert_eq!(config.server.site_dir, "/srv/site");
        assert!(!config.servo.enabled);

        let options = config.pipeline_options();
        assert_eq!(options.capture.frame_timeout, Duration::from_secs(2));
        assert_eq!(options.max_waiters, 8);
        assert_eq!(options.quality, 90);
    }

    #[test]
    fn test_invalid_quality() {
        assert!(Config::from_str("[encoder]\nquality = 0").is_err());
        assert!(Config::from_str("[encoder]\nquality = 101").is_err());
    }

    #[test]
    fn test_invalid_max_waiters() {
        let result = Config::from_str("[stream]\nmax-waiters = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_size() {
        assert!(Config::from_str("[camera]\nsize = \"wide\"").is_err());
        assert!(Config::from_str("[camera]\nsize = \"0x480\"").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x480"), Some((640, 480)));
        assert_eq!(parse_size(" 1920X1080 "), Some((1920, 1080)));
        assert_eq!(parse_size("640"), None);
        assert_eq!(parse_size("ax480"), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[camera]\ntest-pattern = true\nwidth = 320\nheight = 240").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.camera.test_pattern);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.fps, 30);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load("/nonexistent/streamer.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = Config::from_str(&toml_str).unwrap();
        assert_eq!(config.encoder.quality, parsed.encoder.quality);
        assert_eq!(config.server.listen, parsed.server.listen);
    }
}
