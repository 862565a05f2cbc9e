use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pacing of each viewer's delivery loop.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_boundary")]
    pub boundary: String,
    /// Optional HTML file served at `/`. Falls back to the built-in page.
    #[serde(default)]
    pub index_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Device opened when no source argument is given.
    #[serde(default = "default_device")]
    pub device: String,
    /// ffmpeg input format used for the default device (`-f`).
    #[serde(default = "default_device_format")]
    pub device_format: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    /// Read file sources at their native frame rate instead of as fast as possible.
    #[serde(default)]
    pub realtime: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Binarization threshold applied to the foreground delta (0..=255).
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Contours with a smaller area (pixel²) are treated as noise.
    #[serde(default = "default_minimum_area")]
    pub minimum_area: f64,
    /// Chebyshev radius of the square dilation kernel; 1 is a 3x3 kernel.
    #[serde(default = "default_dilate_radius")]
    pub dilate_radius: u8,
    #[serde(default = "default_history")]
    pub history: u32,
    /// Squared Mahalanobis distance above which a pixel is foreground.
    #[serde(default = "default_var_threshold")]
    pub var_threshold: f32,
    #[serde(default = "default_var_init")]
    pub var_init: f32,
    #[serde(default = "default_var_min")]
    pub var_min: f32,
    #[serde(default = "default_var_max")]
    pub var_max: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_font_path")]
    pub font_path: Option<String>,
    #[serde(default = "default_text_x")]
    pub text_x: i32,
    /// Baseline of the status text.
    #[serde(default = "default_text_y")]
    pub text_y: i32,
    #[serde(default = "default_text_scale")]
    pub text_scale: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// Downscale ratio applied to both dimensions before compression.
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frame_interval_ms: default_frame_interval_ms(),
            boundary: default_boundary(),
            index_path: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            device_format: default_device_format(),
            width: default_width(),
            height: default_height(),
            ffmpeg_bin: default_ffmpeg_bin(),
            realtime: false,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            minimum_area: default_minimum_area(),
            dilate_radius: default_dilate_radius(),
            history: default_history(),
            var_threshold: default_var_threshold(),
            var_init: default_var_init(),
            var_min: default_var_min(),
            var_max: default_var_max(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: default_font_path(),
            text_x: default_text_x(),
            text_y: default_text_y(),
            text_scale: default_text_scale(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            quality: default_quality(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.encoder.scale > 0.0 && self.encoder.scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "encoder.scale must be in (0, 1], got {}",
                self.encoder.scale
            )));
        }
        if self.encoder.quality == 0 || self.encoder.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "encoder.quality must be in 1..=100, got {}",
                self.encoder.quality
            )));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid(
                "capture.width and capture.height must be non-zero".into(),
            ));
        }
        if self.server.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.frame_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_boundary() -> String {
    "frame".into()
}
fn default_device() -> String {
    "/dev/video0".into()
}
fn default_device_format() -> String {
    "v4l2".into()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_ffmpeg_bin() -> String {
    "ffmpeg".into()
}
fn default_threshold() -> u8 {
    25
}
fn default_minimum_area() -> f64 {
    3000.0
}
fn default_dilate_radius() -> u8 {
    1
}
fn default_history() -> u32 {
    500
}
fn default_var_threshold() -> f32 {
    16.0
}
fn default_var_init() -> f32 {
    15.0
}
fn default_var_min() -> f32 {
    4.0
}
fn default_var_max() -> f32 {
    75.0
}
fn default_font_path() -> Option<String> {
    Some("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".into())
}
fn default_text_x() -> i32 {
    10
}
fn default_text_y() -> i32 {
    20
}
fn default_text_scale() -> f32 {
    18.0
}
fn default_scale() -> f64 {
    0.5
}
fn default_quality() -> u8 {
    80
}
fn default_log_level() -> String {
    "info".into()
}
