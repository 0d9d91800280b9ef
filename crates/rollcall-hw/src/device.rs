//! Capture device contract: constraints in, a live stream or a fault out.

use crate::stream::MediaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which physical camera to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the operator.
    #[default]
    User,
    /// Back camera, facing the room.
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode: {other} (expected user or environment)")),
        }
    }
}

/// Stream request. Resolution is a preference, not a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl Constraints {
    /// Video-only request for the given camera and ideal resolution.
    pub fn video(facing_mode: FacingMode, ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            facing_mode,
            ideal_width,
            ideal_height,
            audio: false,
        }
    }
}

/// Raw failure reported by a device backend, before classification.
#[derive(Error, Debug)]
pub enum DeviceFault {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no capture device available")]
    NoDevice,
    #[error("constraints not satisfiable: {0}")]
    Overconstrained(String),
    #[error("insecure origin: {0}")]
    InsecureContext(String),
    #[error("{0}")]
    Other(String),
}

impl DeviceFault {
    pub fn io(path: &str, source: std::io::Error) -> Self {
        DeviceFault::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// A source of live video streams.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request a stream satisfying `constraints`.
    ///
    /// Resolves once the device has granted the stream. The first frame may
    /// arrive later; see [`MediaStream::ready`].
    async fn acquire(&self, constraints: &Constraints) -> Result<MediaStream, DeviceFault>;
}
