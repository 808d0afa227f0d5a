//! Common types used across IPC messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for starting a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// What to capture.
    pub source: InputSource,

    /// Include the mouse cursor in captured frames.
    pub capture_cursor: bool,

    /// Ask the native backend for frames as fast as it can produce them.
    pub max_capture_rate: bool,

    /// Which live-capture backend to use.
    pub backend: BackendPreference,

    /// Render loop cadence in frames per second (default: 60).
    pub render_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: InputSource::default(),
            capture_cursor: true,
            max_capture_rate: false,
            backend: BackendPreference::Auto,
            render_fps: 60,
        }
    }
}

/// The source a capture session reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// A whole monitor; `None` means the primary one.
    Desktop { monitor: Option<String> },

    /// A single window; `None` lets the backend ask the user.
    Window { window: Option<String> },

    /// A still image shown as a perpetual frame.
    Image { path: PathBuf },
}

impl Default for InputSource {
    fn default() -> Self {
        Self::Desktop { monitor: None }
    }
}

impl InputSource {
    /// Returns true for live (desktop or window) sources.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Image { .. })
    }
}

/// Preferred live-capture backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Native capture if the platform supports it, otherwise the bridge.
    #[default]
    Auto,

    /// Only the platform's built-in capture API.
    Native,

    /// Only the dynamically loaded bridge module.
    Bridge,
}

/// The input mode a session runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputModeKind {
    /// Platform capture delivering GPU surfaces.
    Native,

    /// Raw pixel buffers from the bridge module.
    Bridge,

    /// A static image texture.
    Image,
}

impl InputModeKind {
    /// Returns the display name for this mode.
    pub fn name(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Bridge => "bridge",
            Self::Image => "image",
        }
    }
}

/// Real-time capture metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureMetrics {
    /// Frames per second arriving from the capture backend.
    pub capture_fps: f32,

    /// Frames per second handed to the shader pipeline.
    pub render_fps: f32,

    /// Target render frames per second.
    pub target_fps: f32,

    /// Total frames ingested by the session.
    pub frames_captured: u64,

    /// Total frames handed to the shader pipeline.
    pub frames_rendered: u64,

    /// Rendered frames that repeated the previous capture.
    pub frames_repeated: u64,

    /// Current content width in pixels.
    pub content_width: u32,

    /// Current content height in pixels.
    pub content_height: u32,

    /// Capture uptime in seconds.
    pub uptime_seconds: u64,
}

/// A capture source (monitor or window).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSource {
    /// Unique identifier for this source.
    pub id: String,

    /// Display name for the UI.
    pub name: String,

    /// Type of capture source.
    pub source_type: CaptureSourceType,

    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

/// Type of capture source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaptureSourceType {
    /// A monitor/display.
    Monitor,

    /// An application window.
    Window,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{ "source": { "kind": "window", "window": "window:42" } }"#)
                .unwrap();

        assert_eq!(
            config.source,
            InputSource::Window {
                window: Some("window:42".to_string())
            }
        );
        assert!(config.capture_cursor);
        assert!(!config.max_capture_rate);
        assert_eq!(config.backend, BackendPreference::Auto);
        assert_eq!(config.render_fps, 60);
    }

    #[test]
    fn test_backend_preference_names() {
        let backend: BackendPreference = serde_json::from_str(r#""bridge""#).unwrap();
        assert_eq!(backend, BackendPreference::Bridge);
    }

    #[test]
    fn test_image_source_is_not_live() {
        let image = InputSource::Image {
            path: PathBuf::from("frame.png"),
        };
        assert!(!image.is_live());
        assert!(InputSource::default().is_live());
    }
}
