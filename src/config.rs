// src/config.rs

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timing policy of the recording/playback engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// "Hold to record": manual stop is ignored before this many seconds.
    pub min_hold_secs: f64,
    /// Recording stops on its own once it reaches this length.
    pub max_recording_secs: f64,
    /// Rate of the live current-time timer.
    pub tick_hz: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_hold_secs: 8.0,
            max_recording_secs: 30.0,
            tick_hz: 20.0,
        }
    }
}

impl EngineConfig {
    pub fn with_min_hold(mut self, secs: f64) -> Self {
        self.min_hold_secs = secs;
        self
    }

    pub fn with_max_recording(mut self, secs: f64) -> Self {
        self.max_recording_secs = secs;
        self
    }

    pub fn with_tick_hz(mut self, hz: f64) -> Self {
        self.tick_hz = hz;
        self
    }

    /// Falls back to 20 Hz for a rate `validate` would reject.
    pub fn tick_interval(&self) -> Duration {
        if self.tick_hz.is_finite() && self.tick_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.tick_hz)
        } else {
            Duration::from_millis(50)
        }
    }

    /// Boundary inclusive: exactly `min_hold_secs` may stop.
    pub fn can_stop_at(&self, current_time: f64) -> bool {
        current_time >= self.min_hold_secs
    }

    pub fn reached_max_at(&self, current_time: f64) -> bool {
        current_time >= self.max_recording_secs
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            bail!("tick_hz must be a positive number, got {}", self.tick_hz);
        }
        if !(self.max_recording_secs.is_finite() && self.max_recording_secs > 0.0) {
            bail!(
                "max_recording_secs must be a positive number, got {}",
                self.max_recording_secs
            );
        }
        if self.min_hold_secs.is_nan()
            || self.min_hold_secs < 0.0
            || self.min_hold_secs > self.max_recording_secs
        {
            bail!(
                "min_hold_secs ({}) must lie between 0 and max_recording_secs ({})",
                self.min_hold_secs,
                self.max_recording_secs
            );
        }
        Ok(())
    }
}

/// Shape of the summary produced by the waveform pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WaveformConfig {
    /// Number of bars in every summary.
    pub summary_len: usize,
    /// Frames folded into one amplitude value during extraction.
    pub block_frames: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            summary_len: 100,
            block_frames: 512,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub waveform: WaveformConfig,
    /// Where the JSON item store lives. `None` defers to the caller's default.
    pub store_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.waveform.block_frames == 0 {
            bail!("block_frames must be at least 1");
        }
        Ok(())
    }

    pub fn store_dir_or(&self, fallback: impl Into<PathBuf>) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(|| fallback.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.min_hold_secs, 8.0);
        assert_eq!(cfg.engine.max_recording_secs, 30.0);
        assert_eq!(cfg.waveform.summary_len, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{ "engine": { "min_hold_secs": 1.5 } }"#).unwrap();
        assert_eq!(cfg.engine.min_hold_secs, 1.5);
        assert_eq!(cfg.engine.max_recording_secs, 30.0);
        assert_eq!(cfg.waveform, WaveformConfig::default());
        assert_eq!(cfg.store_dir, None);
    }

    #[test]
    fn hold_gate_is_inclusive() {
        let cfg = EngineConfig::default();
        assert!(!cfg.can_stop_at(7.999));
        assert!(cfg.can_stop_at(8.0));
        assert!(cfg.reached_max_at(30.0));
        assert!(!cfg.reached_max_at(29.95));
    }

    #[test]
    fn rejects_inverted_policy() {
        let cfg = EngineConfig::default().with_min_hold(40.0);
        assert!(cfg.validate().is_err());
        let cfg = EngineConfig::default().with_tick_hz(0.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = AppConfig::default();
        cfg.engine = cfg.engine.with_max_recording(12.0);
        cfg.save_to_disk(&path).unwrap();
        assert_eq!(AppConfig::load_from_disk(&path).unwrap(), cfg);
    }
}
