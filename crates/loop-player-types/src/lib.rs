use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport state of a playback controller.
///
/// `Starting`, `Pausing` and `Stopping` are intermediate: they are left as soon as the
/// active source confirms that it started or halted.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TransportState {
    /// Idle with the source rewound to the beginning.
    #[default]
    Stopped = 0,
    /// Play was requested; waiting for the source to report that it is running.
    Starting = 1,
    /// Source is producing audio.
    Playing = 2,
    /// Pause was requested; waiting for the source to halt.
    Pausing = 3,
    /// Source halted with its position kept.
    Paused = 4,
    /// Stop was requested; waiting for the source to halt.
    Stopping = 5,
}

impl TransportState {
    /// Decode the `u8` representation used by lock-free status cells.
    ///
    /// Unknown values map to `Stopped`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Playing,
            3 => Self::Pausing,
            4 => Self::Paused,
            5 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether a stop control should be enabled in this state.
    pub fn can_stop(self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Whether a play control should be enabled in this state.
    pub fn can_play(self) -> bool {
        matches!(self, Self::Stopped | Self::Paused)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Playing => "playing",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time playback status published by the engine.
///
/// Front ends poll this at whatever cadence suits them (label refresh, API responses).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStatus {
    /// Current transport state.
    pub state: TransportState,
    /// `true` when a source is installed.
    pub has_source: bool,
    /// Whether the installed source wraps at its end.
    pub looping: bool,
    /// Read cursor of the active source in frames.
    pub position_frames: u64,
    /// Length of the active source in frames.
    pub length_frames: u64,
    /// Cursor position in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Source length in milliseconds.
    pub duration_ms: Option<u64>,
    /// Source sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Source channel count.
    pub channels: Option<u16>,
    /// Target output level in `[0, 1]`.
    pub level: f32,
    /// Events the audio thread could not deliver because the event queue was full.
    pub dropped_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_u8_roundtrip_covers_all_states() {
        for state in [
            TransportState::Stopped,
            TransportState::Starting,
            TransportState::Playing,
            TransportState::Pausing,
            TransportState::Paused,
            TransportState::Stopping,
        ] {
            assert_eq!(TransportState::from_u8(state.as_u8()), state);
        }
        assert_eq!(TransportState::from_u8(200), TransportState::Stopped);
    }

    #[test]
    fn control_availability_matches_states() {
        assert!(TransportState::Stopped.can_play());
        assert!(TransportState::Paused.can_play());
        assert!(!TransportState::Playing.can_play());
        assert!(!TransportState::Stopped.can_stop());
        assert!(TransportState::Paused.can_stop());
    }

    #[test]
    fn status_serializes_state_as_snake_case() {
        let status = PlaybackStatus {
            state: TransportState::Paused,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "paused");
        assert_eq!(json["has_source"], false);
    }
}
