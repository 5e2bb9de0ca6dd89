//! Sample-accurate looping of a short in-memory buffer.
//!
//! The player copies from its buffer into each output block, wrapping the cursor back to
//! frame 0 at the end of the buffer, and ramps the gain across the block from the level
//! the previous block ended on to the current target level.

use std::time::Duration;

use crate::buffer::{OutputBlock, SampleBuffer};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::gain::{GainRamp, LevelControl};
use crate::source::{AudioSource, render_span};

pub struct LoopPlayer {
    buffer: SampleBuffer,
    position: usize,
    level: LevelControl,
    ramp: GainRamp,
    max_duration: Duration,
}

impl LoopPlayer {
    /// Empty player, silent until [`LoopPlayer::load`] succeeds.
    pub fn new(level: LevelControl, max_duration: Duration) -> Self {
        let ramp = GainRamp::new(level.get());
        Self {
            buffer: SampleBuffer::empty(0),
            position: 0,
            level,
            ramp,
            max_duration,
        }
    }

    pub fn from_config(config: &EngineConfig, level: LevelControl) -> Self {
        Self::new(level, config.max_duration())
    }

    /// Replace the buffer and rewind.
    ///
    /// Taking `&mut self` keeps this exclusive with [`LoopPlayer::produce_block`]; once the
    /// player is installed in a transport, build a new player instead and open it.
    /// On error the current buffer and cursor are kept.
    pub fn load(&mut self, buffer: SampleBuffer) -> Result<()> {
        buffer.validate()?;
        crate::config::check_duration(buffer.frames(), buffer.sample_rate(), self.max_duration)?;
        tracing::debug!(
            frames = buffer.frames(),
            channels = buffer.channel_count(),
            rate_hz = buffer.sample_rate(),
            "loop buffer loaded"
        );
        self.buffer = buffer;
        self.position = 0;
        Ok(())
    }

    /// Builder form of [`LoopPlayer::load`].
    pub fn with_buffer(mut self, buffer: SampleBuffer) -> Result<Self> {
        self.load(buffer)?;
        Ok(self)
    }

    /// Set the target level; clamped to `[0, 1]`. Safe from any thread via
    /// [`LoopPlayer::level_control`].
    pub fn set_level(&self, level: f32) {
        self.level.set(level);
    }

    pub fn level_control(&self) -> LevelControl {
        self.level.clone()
    }

    /// Level the last rendered block ended on.
    pub fn previous_level(&self) -> f32 {
        self.ramp.previous()
    }

    /// Render the active region of `out`, wrapping at the end of the buffer.
    ///
    /// An empty buffer renders silence.
    pub fn produce_block(&mut self, out: &mut OutputBlock<'_>) {
        let frames = out.num_frames();
        let gain = self.ramp.begin(self.level.get(), frames);
        let total = self.buffer.frames();

        if total == 0 {
            out.clear();
            self.ramp.finish(gain);
            return;
        }

        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(total - self.position);
            render_span(&self.buffer, out, offset, self.position, n, &gain);
            offset += n;
            self.position += n;
            if self.position == total {
                self.position = 0;
            }
        }

        self.ramp.finish(gain);
    }
}

impl AudioSource for LoopPlayer {
    fn produce_block(&mut self, out: &mut OutputBlock<'_>) {
        LoopPlayer::produce_block(self, out);
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, frame: usize) {
        let total = self.buffer.frames();
        self.position = if total == 0 { 0 } else { frame % total };
    }

    fn total_frames(&self) -> usize {
        self.buffer.frames()
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn channel_count(&self) -> usize {
        self.buffer.channel_count()
    }

    fn is_looping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use approx::assert_relative_eq;

    fn player(level: f32) -> LoopPlayer {
        LoopPlayer::new(LevelControl::new(level), Duration::from_secs(2))
    }

    fn counting_buffer(frames: usize, channels: usize) -> SampleBuffer {
        let data = (0..channels)
            .map(|ch| (0..frames).map(|i| (ch * 100 + i) as f32 / 1000.0).collect())
            .collect();
        SampleBuffer::new(data, 48_000).unwrap()
    }

    #[test]
    fn six_frames_from_four_frame_stereo_buffer_at_half_level() {
        let mut p = player(0.5);
        p.load(SampleBuffer::new(vec![vec![1.0; 4], vec![1.0; 4]], 48_000).unwrap())
            .unwrap();

        let mut data = [0.0f32; 12];
        p.produce_block(&mut OutputBlock::new(&mut data, 2));

        assert!(data.iter().all(|&s| s == 0.5));
        assert_eq!(data[8..12], data[0..4]);
        assert_eq!(AudioSource::position(&p), 2);
    }

    #[test]
    fn cursor_returns_to_zero_after_one_pass_and_output_repeats() {
        let mut p = player(1.0);
        p.load(counting_buffer(5, 2)).unwrap();

        let mut first = [0.0f32; 10];
        p.produce_block(&mut OutputBlock::new(&mut first, 2));
        assert_eq!(AudioSource::position(&p), 0);

        let mut second = [0.0f32; 10];
        p.produce_block(&mut OutputBlock::new(&mut second, 2));
        assert_eq!(first, second);
    }

    #[test]
    fn wraps_across_many_small_blocks() {
        let mut p = player(1.0);
        p.load(counting_buffer(7, 1)).unwrap();
        let mut collected = Vec::new();
        for _ in 0..5 {
            let mut data = [0.0f32; 3];
            p.produce_block(&mut OutputBlock::new(&mut data, 1));
            collected.extend_from_slice(&data);
        }
        let expected: Vec<f32> = (0..15).map(|i| (i % 7) as f32 / 1000.0).collect();
        assert_eq!(collected, expected);
        assert_eq!(AudioSource::position(&p), 15 % 7);
    }

    #[test]
    fn gain_ramps_across_the_whole_block() {
        let mut p = player(0.0);
        p.load(SampleBuffer::new(vec![vec![1.0; 3]], 48_000).unwrap())
            .unwrap();
        p.set_level(1.0);

        let mut data = [0.0f32; 8];
        p.produce_block(&mut OutputBlock::new(&mut data, 1));

        for (i, &s) in data.iter().enumerate() {
            assert_relative_eq!(s, i as f32 / 8.0, epsilon = 1e-6);
        }
        assert_eq!(p.previous_level(), 1.0);
    }

    #[test]
    fn mono_source_fills_every_output_channel() {
        let mut p = player(1.0);
        p.load(counting_buffer(4, 1)).unwrap();

        let mut data = [0.0f32; 4 * 3];
        p.produce_block(&mut OutputBlock::new(&mut data, 3));

        for frame in data.chunks_exact(3) {
            assert_eq!(frame[0], frame[1]);
            assert_eq!(frame[1], frame[2]);
        }
    }

    #[test]
    fn stereo_into_four_channels_wraps_channel_index() {
        let mut p = player(1.0);
        p.load(counting_buffer(2, 2)).unwrap();

        let mut data = [0.0f32; 8];
        p.produce_block(&mut OutputBlock::new(&mut data, 4));

        for frame in data.chunks_exact(4) {
            assert_eq!(frame[2], frame[0]);
            assert_eq!(frame[3], frame[1]);
        }
    }

    #[test]
    fn empty_buffer_renders_silence() {
        let mut p = player(1.0);
        let mut data = [3.0f32; 6];
        p.produce_block(&mut OutputBlock::new(&mut data, 2));
        assert_eq!(data, [0.0; 6]);
        assert_eq!(AudioSource::position(&p), 0);
    }

    #[test]
    fn renders_only_the_active_region() {
        let mut p = player(1.0);
        p.load(SampleBuffer::new(vec![vec![1.0; 4]], 48_000).unwrap())
            .unwrap();
        let mut data = [7.0f32; 6];
        p.produce_block(&mut OutputBlock::new(&mut data, 1).with_region(2, 3));
        assert_eq!(data, [7.0, 7.0, 1.0, 1.0, 1.0, 7.0]);
        assert_eq!(AudioSource::position(&p), 3);
    }

    #[test]
    fn load_rejects_long_buffers_and_keeps_the_old_one() {
        let mut p = player(1.0);
        p.load(counting_buffer(4, 1)).unwrap();
        let mut data = [0.0f32; 1];
        p.produce_block(&mut OutputBlock::new(&mut data, 1));

        let too_long = SampleBuffer::new(vec![vec![0.0; 48_000 * 3]], 48_000).unwrap();
        let err = p.load(too_long).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedDuration { .. }));
        assert_eq!(AudioSource::total_frames(&p), 4);
        assert_eq!(AudioSource::position(&p), 1);
    }

    #[test]
    fn load_resets_cursor() {
        let mut p = player(1.0);
        p.load(counting_buffer(4, 1)).unwrap();
        let mut data = [0.0f32; 3];
        p.produce_block(&mut OutputBlock::new(&mut data, 1));
        p.load(counting_buffer(6, 1)).unwrap();
        assert_eq!(AudioSource::position(&p), 0);
    }

    #[test]
    fn set_level_is_clamped() {
        let p = player(0.5);
        p.set_level(4.0);
        assert_eq!(p.level_control().get(), 1.0);
    }
}
