//! Command-line arguments and capture configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};

use glass_ipc::{BackendPreference, CaptureConfig, InputSource};

#[derive(Parser, Debug)]
#[command(name = "glass")]
#[command(about = "Capture a monitor, window, or image and feed it to the shader stage")]
#[command(version)]
pub struct Cli {
    /// JSON capture configuration; flags override its fields
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Capture a monitor (the primary one when no id is given)
    #[arg(long, value_name = "ID", num_args = 0..=1, conflicts_with_all = ["window", "image"])]
    pub desktop: Option<Option<String>>,

    /// Capture a window by id
    #[arg(long, value_name = "ID", conflicts_with = "image")]
    pub window: Option<String>,

    /// Show a still image
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Include the mouse cursor
    #[arg(long, conflicts_with = "no_cursor")]
    pub cursor: bool,

    /// Leave the mouse cursor out
    #[arg(long)]
    pub no_cursor: bool,

    /// Ask the native backend for frames as fast as it can produce them
    #[arg(long)]
    pub max_rate: bool,

    /// Live capture backend
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Never load the capture module
    #[arg(long)]
    pub no_bridge: bool,

    /// Render loop rate
    #[arg(long, value_name = "FPS")]
    pub fps: Option<u32>,

    /// Print the capturable monitors and windows, then exit
    #[arg(long)]
    pub list_sources: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Auto,
    Native,
    Bridge,
}

impl From<Backend> for BackendPreference {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Auto => BackendPreference::Auto,
            Backend::Native => BackendPreference::Native,
            Backend::Bridge => BackendPreference::Bridge,
        }
    }
}

/// Read a capture configuration from a JSON file.
pub fn load_config(path: &Path) -> anyhow::Result<CaptureConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

impl Cli {
    /// The configuration file (or defaults) with flags applied on top.
    pub fn capture_config(&self) -> anyhow::Result<CaptureConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => CaptureConfig::default(),
        };

        if let Some(monitor) = &self.desktop {
            config.source = InputSource::Desktop {
                monitor: monitor.clone(),
            };
        } else if let Some(window) = &self.window {
            config.source = InputSource::Window {
                window: Some(window.clone()),
            };
        } else if let Some(path) = &self.image {
            config.source = InputSource::Image { path: path.clone() };
        }

        if self.cursor {
            config.capture_cursor = true;
        } else if self.no_cursor {
            config.capture_cursor = false;
        }

        if self.max_rate {
            config.max_capture_rate = true;
        }
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(fps) = self.fps {
            anyhow::ensure!(fps > 0, "--fps must be positive");
            config.render_fps = fps;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("glass").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).capture_config().unwrap();
        assert_eq!(config, CaptureConfig::default());
    }

    #[test]
    fn test_desktop_with_and_without_id() {
        let config = parse(&["--desktop"]).capture_config().unwrap();
        assert_eq!(config.source, InputSource::Desktop { monitor: None });

        let config = parse(&["--desktop", "monitor:42"]).capture_config().unwrap();
        assert_eq!(
            config.source,
            InputSource::Desktop {
                monitor: Some("monitor:42".into())
            }
        );
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("glass-cli-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"source":{"kind":"window","window":"window:7"},"capture_cursor":true,"render_fps":30}"#,
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--no-cursor",
            "--backend",
            "bridge",
        ]);
        let config = cli.capture_config().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            config.source,
            InputSource::Window {
                window: Some("window:7".into())
            }
        );
        assert!(!config.capture_cursor);
        assert_eq!(config.backend, BackendPreference::Bridge);
        assert_eq!(config.render_fps, 30);
    }

    #[test]
    fn test_conflicting_sources_rejected() {
        let result = Cli::try_parse_from(["glass", "--image", "a.png", "--window", "window:1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_fps_rejected() {
        assert!(parse(&["--fps", "0"]).capture_config().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(load_config(Path::new("/nonexistent/glass.json")).is_err());
    }
}
