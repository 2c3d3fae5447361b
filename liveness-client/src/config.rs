//! Client configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use liveness_core::channel::DEFAULT_CONNECT_TIMEOUT;
use liveness_core::{
    CaptureConstraints, CaptureSource, Facing, LabelTable, LivenessError, SessionConfig,
    StillImageSource, TestPatternSource, WsConnector,
};

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service and pacing.
    pub session: SessionSection,
    /// Where frames come from.
    pub capture: CaptureSection,
    /// Direction label overrides, keyed by direction token.
    pub labels: BTreeMap<String, String>,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Service and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// WebSocket address of the liveness service.
    pub address: String,
    /// Delay between a reply and the next frame.
    pub frame_interval_ms: u64,
    /// JPEG quality, 0.0 - 1.0.
    pub jpeg_quality: f64,
    /// Give up after this long without a message. 0 waits forever.
    pub idle_timeout_ms: u64,
    /// Limit on the WebSocket opening handshake.
    pub connect_timeout_ms: u64,
    /// Dots to draw until the service reports its own total.
    pub total_steps: u32,
}

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    /// V4L2 device node, e.g. `/dev/video0`. Takes precedence over
    /// `frames`; needs the `v4l` feature.
    pub device: String,
    /// Image file or directory of stills. Empty uses the test pattern.
    pub frames: String,
    /// Requested width.
    pub width: u32,
    /// Requested height.
    pub height: u32,
    /// Camera facing hint.
    pub facing: Facing,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SessionSection {
    fn default() -> Self {
        let base = SessionConfig::default();
        Self {
            address: base.address,
            frame_interval_ms: base.frame_interval.as_millis() as u64,
            jpeg_quality: (f64::from(base.jpeg_quality) * 100.0).round() / 100.0,
            idle_timeout_ms: base.idle_timeout.map_or(0, |t| t.as_millis() as u64),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            total_steps: base.total_steps,
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        let base = CaptureConstraints::default();
        Self {
            device: String::new(),
            frames: String::new(),
            width: base.width,
            height: base.height,
            facing: base.facing,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// WebSocket connector honouring the configured handshake limit.
    pub fn connector(&self) -> WsConnector {
        WsConnector::new()
            .with_connect_timeout(Duration::from_millis(self.session.connect_timeout_ms.max(1)))
    }

    /// Build and validate the session configuration.
    pub fn into_session_config(&self) -> Result<SessionConfig, LivenessError> {
        let session = SessionConfig {
            address: self.session.address.clone(),
            frame_interval: Duration::from_millis(self.session.frame_interval_ms),
            jpeg_quality: self.session.jpeg_quality as f32,
            total_steps: self.session.total_steps,
            idle_timeout: match self.session.idle_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            constraints: CaptureConstraints {
                facing: self.capture.facing,
                width: self.capture.width,
                height: self.capture.height,
            },
            labels: LabelTable::default().with_overrides(self.labels.clone()),
        };
        session.validate()?;
        Ok(session)
    }
}

impl CaptureSection {
    /// A camera when `device` is set, stills on disk when `frames` names
    /// a path, else the test pattern.
    pub fn build_source(&self) -> Result<Arc<dyn CaptureSource>, LivenessError> {
        let device = self.device.trim();
        if !device.is_empty() {
            return camera_source(device);
        }
        if self.frames.trim().is_empty() {
            Ok(Arc::new(TestPatternSource::new()))
        } else {
            Ok(Arc::new(StillImageSource::new(PathBuf::from(&self.frames))))
        }
    }
}

#[cfg(feature = "v4l")]
fn camera_source(device: &str) -> Result<Arc<dyn CaptureSource>, LivenessError> {
    Ok(Arc::new(liveness_core::V4lSource::new(device)))
}

#[cfg(not(feature = "v4l"))]
fn camera_source(_device: &str) -> Result<Arc<dyn CaptureSource>, LivenessError> {
    Err(LivenessError::InvalidConfig(
        "capture.device needs a build with the `v4l` feature",
    ))
}

// ── Tests ────────────────────────────────────────────────────────
