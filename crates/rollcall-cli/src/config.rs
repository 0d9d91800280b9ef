use anyhow::{Context, Result};
use rollcall_core::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// CLI configuration: an optional TOML file, then `ROLLCALL_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 node for the user-facing camera (default: /dev/video0).
    pub camera_user: String,
    /// V4L2 node for the environment-facing camera, if there is one.
    pub camera_environment: Option<String>,
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// How long to wait for the first frame after requesting the camera.
    pub start_timeout_ms: u64,
    /// Pause between releasing and re-acquiring the device on flip.
    pub flip_settle_ms: u64,
    /// Default JPEG quality in [0, 1].
    pub jpeg_quality: f32,
    /// Origin captures are uploaded to. Plain http is only allowed for loopback.
    pub origin: Option<String>,
    /// Where `watch` and file captures are written.
    pub capture_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            camera_user: "/dev/video0".to_string(),
            camera_environment: None,
            ideal_width: session.ideal_width,
            ideal_height: session.ideal_height,
            start_timeout_ms: session.start_timeout.as_millis() as u64,
            flip_settle_ms: session.flip_settle.as_millis() as u64,
            jpeg_quality: session.default_quality,
            origin: None,
            capture_dir: default_data_dir().join("captures"),
        }
    }
}

impl Config {
    /// Load from `$ROLLCALL_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("ROLLCALL_CAMERA_USER") {
            self.camera_user = path;
        }
        if let Some(path) = lookup("ROLLCALL_CAMERA_ENVIRONMENT") {
            self.camera_environment = Some(path).filter(|p| !p.is_empty());
        }
        if let Some(origin) = lookup("ROLLCALL_ORIGIN") {
            self.origin = Some(origin).filter(|o| !o.is_empty());
        }
        if let Some(dir) = lookup("ROLLCALL_CAPTURE_DIR") {
            self.capture_dir = PathBuf::from(dir);
        }
        override_parsed(&lookup, "ROLLCALL_IDEAL_WIDTH", &mut self.ideal_width);
        override_parsed(&lookup, "ROLLCALL_IDEAL_HEIGHT", &mut self.ideal_height);
        override_parsed(&lookup, "ROLLCALL_START_TIMEOUT_MS", &mut self.start_timeout_ms);
        override_parsed(&lookup, "ROLLCALL_FLIP_SETTLE_MS", &mut self.flip_settle_ms);
        override_parsed(&lookup, "ROLLCALL_JPEG_QUALITY", &mut self.jpeg_quality);
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            flip_settle: Duration::from_millis(self.flip_settle_ms),
            default_quality: self.jpeg_quality.clamp(0.0, 1.0),
            origin: self.origin.clone(),
        }
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
