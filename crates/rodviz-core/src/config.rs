//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::Result;
use crate::mesh::SweptTube;
use crate::playback::PlaybackSpeed;
use crate::scene::CameraMode;

/// Configuration for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Playback tick at normal speed, in milliseconds
    pub tick_interval_ms: u64,

    /// Vertices per tube ring
    pub radial_segments: u32,

    pub window_width: u32,
    pub window_height: u32,

    /// Camera mode at startup
    pub camera_mode: CameraMode,

    /// Draw X/Y/Z axes at startup
    pub show_axes: bool,

    pub background: Color,

    /// Playback speed at startup
    pub speed: PlaybackSpeed,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 40,
            radial_segments: SweptTube::DEFAULT_RADIAL_SEGMENTS,
            window_width: 800,
            window_height: 608,
            camera_mode: CameraMode::Turntable,
            show_axes: true,
            background: Color::BLACK,
            speed: PlaybackSpeed::Normal,
        }
    }
}

impl ViewerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Override fields from `RODVIZ_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = var("RODVIZ_TICK_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.tick_interval_ms = ms,
                _ => tracing::warn!(value = %raw, "ignoring invalid RODVIZ_TICK_MS"),
            }
        }

        if let Some(raw) = var("RODVIZ_RADIAL_SEGMENTS") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n >= 3 => self.radial_segments = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid RODVIZ_RADIAL_SEGMENTS"),
            }
        }

        if let Some(raw) = var("RODVIZ_CAMERA") {
            match raw.parse::<CameraMode>() {
                Ok(mode) => self.camera_mode = mode,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid RODVIZ_CAMERA"),
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn tube(&self) -> SweptTube {
        SweptTube::new(self.radial_segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(40));
        assert_eq!(config.radial_segments, 16);
        assert_eq!((config.window_width, config.window_height), (800, 608));
        assert_eq!(config.camera_mode, CameraMode::Turntable);
        assert!(config.show_axes);
        assert_eq!(config.background, Color::BLACK);
    }

    #[test]
    fn env_overrides() {
        let mut config = ViewerConfig::default();
        config.apply_vars(vars(&[
            ("RODVIZ_TICK_MS", "25"),
            ("RODVIZ_RADIAL_SEGMENTS", "8"),
            ("RODVIZ_CAMERA", "arcball"),
        ]));
        assert_eq!(config.tick_interval_ms, 25);
        assert_eq!(config.radial_segments, 8);
        assert_eq!(config.camera_mode, CameraMode::Arcball);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = ViewerConfig::default();
        config.apply_vars(vars(&[
            ("RODVIZ_TICK_MS", "soon"),
            ("RODVIZ_RADIAL_SEGMENTS", "2"),
            ("RODVIZ_CAMERA", "orbit"),
        ]));
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        std::fs::write(&path, r#"{ "radial_segments": 24, "background": "white" }"#).unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.radial_segments, 24);
        assert_eq!(config.background, Color::WHITE);
        assert_eq!(config.tick_interval_ms, 40);
    }
}
