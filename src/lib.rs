pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod player;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::display::TextureFormat;
use crate::pipeline::{DropPolicy, FrameQueue};

pub use capture::{Frame, PixelFormat};
pub use config::ConfigError;
pub use error::{DisplayError, FrameError, PlayerError, SourceError};
pub use player::{PlaybackController, PlayerEvent, PlayerState};

/// Prefix of environment overrides, e.g. `STREAMVIEW__DISPLAY__WIDTH=1280`
pub const ENV_PREFIX: &str = "STREAMVIEW";

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Longest the render loop waits for a frame before polling events again
    pub refresh_interval_ms: u64,
    /// Pause between two refreshes that found no pending event
    pub idle_sleep_ms: u64,
    /// Bound on queued frames, unbounded when absent
    pub queue_capacity: Option<usize>,
    pub drop_policy: DropPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub address: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Describe produced frames with negative strides
    pub bottom_up: bool,
    /// Restart file sources at end of file
    pub looping: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: TextureFormat::Iyuv,
            title: "streamview".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
            idle_sleep_ms: 10,
            queue_capacity: None,
            drop_policy: DropPolicy::Oldest,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            address: "pattern".into(),
            width: 640,
            height: 480,
            fps: 30,
            bottom_up: false,
            looping: true,
        }
    }
}

impl PipelineConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    /// Queue matching the configured bound.
    pub fn frame_queue(&self) -> FrameQueue {
        match self.queue_capacity {
            Some(capacity) => FrameQueue::bounded(capacity, self.drop_policy),
            None => FrameQueue::new(),
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `STREAMVIEW__*` variables,
    /// then check the result with [`validated`](Self::validated).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Reject settings no window or frame can be built from.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let sizes = [
            ("display", self.display.width, self.display.height),
            ("source", self.source.width, self.source.height),
        ];
        for (section, width, height) in sizes {
            if width == 0 || height == 0 {
                return Err(ConfigError::Message(format!(
                    "{section} size must be non-zero, got {width}x{height}"
                )));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pipeline.refresh_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("streamview-{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
[display]
width = 1280
format = "yv12"

[pipeline]
queue_capacity = 8
drop_policy = "newest"

[source]
address = "clip.yuv"
bottom_up = true
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.display.width, 1280);
        assert_eq!(config.display.height, 480);
        assert_eq!(config.display.format, TextureFormat::Yv12);
        assert_eq!(config.pipeline.queue_capacity, Some(8));
        assert_eq!(config.pipeline.drop_policy, DropPolicy::Newest);
        assert_eq!(config.source.address, "clip.yuv");
        assert!(config.source.bottom_up);
        assert_eq!(config.source.fps, 30);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = Config::default();
        config.source.width = 0;
        assert!(matches!(config.validated(), Err(ConfigError::Message(_))));

        let mut config = Config::default();
        config.display.height = 0;
        assert!(config.validated().is_err());

        assert!(Config::default().validated().is_ok());
    }

    #[test]
    fn test_zero_size_in_file_is_an_error() {
        let path =
            std::env::temp_dir().join(format!("streamview-zero-{}.toml", std::process::id()));
        fs::write(&path, "[source]\nwidth = 0\n").unwrap();

        let result = Config::load(Some(&path));
        fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("streamview-does-not-exist.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
