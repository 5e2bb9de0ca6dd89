use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use loop_player_types::{PlaybackStatus, TransportState};

/// Playback status cells written by the audio thread once per block.
///
/// Every field is an independent atomic, so a reader can see a position from one block
/// and a state from the next; that is fine for label refresh and API responses.
#[derive(Debug, Default)]
pub struct SharedStatus {
    state: AtomicU8,
    has_source: AtomicBool,
    looping: AtomicBool,
    position_frames: AtomicU64,
    length_frames: AtomicU64,
    sample_rate: AtomicU32,
    channels: AtomicU32,
    dropped_events: AtomicU64,
}

/// Source details published alongside the transport state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceFacts {
    pub position_frames: u64,
    pub length_frames: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub looping: bool,
}

impl SharedStatus {
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn publish(&self, state: TransportState, source: Option<SourceFacts>) {
        match source {
            Some(facts) => {
                self.position_frames.store(facts.position_frames, Ordering::Relaxed);
                self.length_frames.store(facts.length_frames, Ordering::Relaxed);
                self.sample_rate.store(facts.sample_rate, Ordering::Relaxed);
                self.channels.store(facts.channels, Ordering::Relaxed);
                self.looping.store(facts.looping, Ordering::Relaxed);
                self.has_source.store(true, Ordering::Relaxed);
            }
            None => {
                self.position_frames.store(0, Ordering::Relaxed);
                self.length_frames.store(0, Ordering::Relaxed);
                self.sample_rate.store(0, Ordering::Relaxed);
                self.channels.store(0, Ordering::Relaxed);
                self.looping.store(false, Ordering::Relaxed);
                self.has_source.store(false, Ordering::Relaxed);
            }
        }
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot suitable for UI refresh or API responses.
    pub fn snapshot(&self, level: f32) -> PlaybackStatus {
        let state = self.state();
        let has_source = self.has_source.load(Ordering::Relaxed);
        let sample_rate = self.sample_rate.load(Ordering::Relaxed);
        let position_frames = self.position_frames.load(Ordering::Relaxed);
        let length_frames = self.length_frames.load(Ordering::Relaxed);
        let channels = self.channels.load(Ordering::Relaxed);

        let to_ms = |frames: u64| -> Option<u64> {
            if has_source && sample_rate > 0 {
                Some(frames.saturating_mul(1000) / sample_rate as u64)
            } else {
                None
            }
        };

        PlaybackStatus {
            state,
            has_source,
            looping: self.looping.load(Ordering::Relaxed),
            position_frames,
            length_frames,
            elapsed_ms: to_ms(position_frames),
            duration_ms: to_ms(length_frames),
            sample_rate: (has_source && sample_rate > 0).then_some(sample_rate),
            channels: (has_source && channels > 0).then(|| u16::try_from(channels).unwrap_or(u16::MAX)),
            level,
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }
}
