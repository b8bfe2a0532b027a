use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GuitarError, Result, SynthesisOptions};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub synthesis: SynthesisOptions,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Parses a JSON preset. Missing fields keep their defaults, the
    /// synthesis options are clamped into their valid ranges and the
    /// schedule is rejected if it could not drive the scheduler.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: AppConfig = serde_json::from_str(json)?;
        config.synthesis = config.synthesis.clamped();
        config.schedule.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "loading configuration");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
        }
    }
}

/// Timing of the strum pattern and its lookahead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Length of one rhythmic unit; a bar is 32 units.
    pub time_unit_seconds: f64,
    /// Amount the lookahead grows each time an event lands inside the window.
    pub precache_step_seconds: f64,
    /// Events closer than this to the clock widen the lookahead.
    pub lookahead_window_seconds: f64,
}

impl ScheduleConfig {
    /// All fields finite, a positive time unit and non-negative lookahead.
    pub fn validate(&self) -> Result<()> {
        if !self.time_unit_seconds.is_finite() || self.time_unit_seconds <= 0.0 {
            return Err(GuitarError::InvalidInput(
                "schedule.time_unit_seconds must be positive and finite",
            ));
        }
        if !self.precache_step_seconds.is_finite() || self.precache_step_seconds < 0.0 {
            return Err(GuitarError::InvalidInput(
                "schedule.precache_step_seconds must be finite and not negative",
            ));
        }
        if !self.lookahead_window_seconds.is_finite() || self.lookahead_window_seconds < 0.0 {
            return Err(GuitarError::InvalidInput(
                "schedule.lookahead_window_seconds must be finite and not negative",
            ));
        }
        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time_unit_seconds: 0.12,
            precache_step_seconds: 0.1,
            lookahead_window_seconds: 20.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json_str(
            r#"{ "audio": { "sample_rate": 48000 }, "synthesis": { "stereo_spread": 0.9 } }"#,
        )
        .unwrap();

        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.synthesis.stereo_spread, 0.9);
        assert_eq!(config.synthesis.string_damping, 0.5);
        assert_eq!(config.schedule, ScheduleConfig::default());
    }

    #[test]
    fn clamps_loaded_options() {
        let config = AppConfig::from_json_str(
            r#"{ "synthesis": { "string_damping": 3.0, "body": "resonate" } }"#,
        )
        .unwrap();
        assert_eq!(config.synthesis.string_damping, 0.7);
        assert_eq!(config.synthesis.body, crate::BodyResonance::Resonate);
    }

    #[test]
    fn rejects_unusable_schedules() {
        for json in [
            r#"{ "schedule": { "time_unit_seconds": 0.0 } }"#,
            r#"{ "schedule": { "time_unit_seconds": -0.12 } }"#,
            r#"{ "schedule": { "precache_step_seconds": -1.0 } }"#,
            r#"{ "schedule": { "lookahead_window_seconds": 1e400 } }"#,
        ] {
            let err = AppConfig::from_json_str(json).unwrap_err();
            assert!(
                matches!(err, crate::GuitarError::InvalidInput(_) | crate::GuitarError::Json(_)),
                "{json} gave {err}"
            );
        }

        assert!(ScheduleConfig::default().validate().is_ok());
    }

    #[test]
    fn reports_malformed_json() {
        let err = AppConfig::from_json_str("{ not json").unwrap_err();
        assert!(format!("{err}").starts_with("invalid configuration"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, crate::GuitarError::Io(_)));
    }
}
