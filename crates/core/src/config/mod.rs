use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration structure for the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub visualizer: VisualizerConfig,
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses and validates configuration from a JSON document. Missing
    /// fields fall back to their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.visualizer.validate()
    }
}

/// Configuration specific to the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames pulled from the source per decode-loop iteration.
    pub chunk_frames: usize,
    /// Capacity of the frame buffer, in chunks.
    pub buffer_capacity: usize,
    pub push_timeout_ms: u64,
    pub join_timeout_ms: u64,
    /// Upper bound on how long the decode loop sleeps while not playing.
    pub idle_wait_ms: u64,
    pub default_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            buffer_capacity: 4,
            push_timeout_ms: 100,
            join_timeout_ms: 1000,
            idle_wait_ms: 10,
            default_volume: 0.7,
        }
    }
}

impl AudioConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_frames == 0 {
            return Err(invalid("audio.chunk_frames", "must be at least 1"));
        }
        if self.buffer_capacity == 0 {
            return Err(invalid("audio.buffer_capacity", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(invalid("audio.default_volume", "must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

/// Configuration for the visualizer catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub enabled: bool,
    /// Name of the visualizer selected at startup.
    pub kind: String,
    pub fps: u32,
    pub bar_count: usize,
    pub smoothing: f32,
    pub sensitivity: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: "spectrum".to_string(),
            fps: 30,
            bar_count: 32,
            smoothing: 0.3,
            sensitivity: 1.0,
        }
    }
}

impl VisualizerConfig {
    /// Interval between two redraws at the configured frame rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8..=128).contains(&self.bar_count) {
            return Err(invalid("visualizer.bar_count", "must be within 8..=128"));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(invalid("visualizer.smoothing", "must be within 0.0..=1.0"));
        }
        if !(0.1..=3.0).contains(&self.sensitivity) {
            return Err(invalid("visualizer.sensitivity", "must be within 0.1..=3.0"));
        }
        if self.fps == 0 {
            return Err(invalid("visualizer.fps", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config = Config::from_json_str(r#"{ "visualizer": { "kind": "mirror" } }"#).unwrap();

        assert_eq!(config.visualizer.kind, "mirror");
        assert_eq!(config.visualizer.bar_count, 32);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = Config::from_json_str(r#"{ "visualizer": { "bar_count": 4 } }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "visualizer.bar_count",
                ..
            }
        ));

        let err = Config::from_json_str(r#"{ "audio": { "buffer_capacity": 0 } }"#).unwrap_err();
        assert!(format!("{err}").contains("buffer_capacity"));
    }

    #[test]
    fn reports_malformed_json() {
        let err = Config::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let mut config = Config::default();
        config.audio.default_volume = 0.25;

        let text = config.to_json_string().unwrap();
        assert_eq!(Config::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuneviz.json");
        std::fs::write(&path, r#"{ "audio": { "chunk_frames": 512 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.audio.chunk_frames, 512);
    }
}
