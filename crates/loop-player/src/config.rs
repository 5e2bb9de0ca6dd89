use std::time::Duration;

use crate::error::{EngineError, Result};

/// Engine tuning parameters shared by the loop player, the transport and the output stage.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Longest source accepted for playback, in seconds.
    pub max_duration_secs: f32,
    /// Capacity of the control → audio command queue.
    pub command_capacity: usize,
    /// Capacity of the audio → control event queue.
    pub event_capacity: usize,
    /// Max frames rendered per engine call inside one output callback.
    pub render_chunk_frames: usize,
}

impl Default for EngineConfig {
    /// Short-sample defaults: a two second cap keeps whole buffers cheap to hold in memory.
    fn default() -> Self {
        Self {
            max_duration_secs: 2.0,
            command_capacity: 64,
            event_capacity: 64,
            render_chunk_frames: 4096,
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return Err(EngineError::invalid(format!(
                "max duration must be a positive number of seconds, got {}",
                self.max_duration_secs
            )));
        }
        if self.command_capacity == 0 {
            return Err(EngineError::invalid("command capacity must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(EngineError::invalid("event capacity must be at least 1"));
        }
        if self.render_chunk_frames == 0 {
            return Err(EngineError::invalid("render chunk must be at least 1 frame"));
        }
        Ok(())
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs_f32(self.max_duration_secs.max(0.0))
    }
}

/// Fail with `UnsupportedDuration` when `frames` at `sample_rate` is longer than `max`.
///
/// A zero sample rate is only accepted for an empty buffer.
pub fn check_duration(frames: usize, sample_rate: u32, max: Duration) -> Result<()> {
    if frames == 0 {
        return Ok(());
    }
    if sample_rate == 0 {
        return Err(EngineError::invalid("sample rate must be non-zero"));
    }
    let seconds = frames as f64 / sample_rate as f64;
    let max_seconds = max.as_secs_f64();
    if seconds > max_seconds {
        return Err(EngineError::UnsupportedDuration {
            seconds,
            max_seconds,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_duration(), Duration::from_secs(2));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = EngineConfig::default();
        cfg.max_duration_secs = f32::NAN;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidInput(_))));

        let mut cfg = EngineConfig::default();
        cfg.command_capacity = 0;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidInput(_))));

        let mut cfg = EngineConfig::default();
        cfg.render_chunk_frames = 0;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn check_duration_allows_exactly_the_cap() {
        let max = Duration::from_secs(2);
        assert!(check_duration(96_000, 48_000, max).is_ok());
        assert!(matches!(
            check_duration(96_001, 48_000, max),
            Err(EngineError::UnsupportedDuration { .. })
        ));
    }

    #[test]
    fn check_duration_handles_empty_and_zero_rate() {
        let max = Duration::from_secs(2);
        assert!(check_duration(0, 0, max).is_ok());
        assert!(matches!(
            check_duration(10, 0, max),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
