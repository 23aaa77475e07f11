//! Viewer configuration.
//!
//! Loaded from a TOML file with `STORY_VIEWER__SECTION__KEY` environment
//! overrides layered on top.

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub viewer_id: String,
    pub api: ApiConfig,
    pub playback: PlaybackConfig,
    pub gesture: GestureConfig,
    pub reactions: ReactionConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".into(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub tick_interval_ms: u64,
    /// Fixed window for image and text items.
    pub image_duration_ms: u64,
    /// Used when a video reports no metadata before the timeout.
    pub video_fallback_ms: u64,
    pub video_max_ms: u64,
    pub metadata_timeout_ms: u64,
    /// How long a video may sit loading or buffering before it is skipped.
    pub stall_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            image_duration_ms: 5_000,
            video_fallback_ms: 10_000,
            video_max_ms: 59_000,
            metadata_timeout_ms: 1_500,
            stall_timeout_ms: 8_000,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub commit_distance_px: f32,
    /// Pixels per millisecond.
    pub commit_velocity: f32,
    /// Fraction of the drag applied when there is nothing further that way.
    pub boundary_resistance: f32,
    /// A move is vertical when `|dy| > vertical_ratio * |dx|`.
    pub vertical_ratio: f32,
    pub tap_slop_px: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            commit_distance_px: 80.0,
            commit_velocity: 0.5,
            boundary_resistance: 0.3,
            vertical_ratio: 1.5,
            tap_slop_px: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    pub live_particles: usize,
    pub max_accumulated_particles: usize,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            live_particles: 10,
            max_accumulated_particles: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "story_viewer=info".into(),
        }
    }
}

impl ViewerConfig {
    /// Load from a TOML file (optional) plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("STORY_VIEWER").separator("__"))
            .build()
            .context("Failed to read configuration")?;
        let parsed: Self = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .context("Failed to read configuration")?;
        let parsed: Self = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        let p = &self.playback;
        ensure!(p.tick_interval_ms > 0, "playback.tick_interval_ms must be positive");
        ensure!(p.image_duration_ms > 0, "playback.image_duration_ms must be positive");
        ensure!(p.video_fallback_ms > 0, "playback.video_fallback_ms must be positive");
        ensure!(p.video_max_ms > 0, "playback.video_max_ms must be positive");
        ensure!(p.metadata_timeout_ms > 0, "playback.metadata_timeout_ms must be positive");
        ensure!(p.stall_timeout_ms > 0, "playback.stall_timeout_ms must be positive");
        ensure!(
            p.video_max_ms >= p.video_fallback_ms,
            "playback.video_max_ms must not be below playback.video_fallback_ms"
        );
        ensure!(
            self.gesture.commit_distance_px > 0.0 && self.gesture.commit_velocity > 0.0,
            "gesture commit thresholds must be positive"
        );
        ensure!(
            (0.0..=1.0).contains(&self.gesture.boundary_resistance),
            "gesture.boundary_resistance must be within 0..=1"
        );
        Ok(())
    }
}
