//! Audio sources the transport can drive.
//!
//! A source only knows how to render frames from its cursor; starting, halting and
//! rewinding are decided by the transport. Two sources ship with the crate:
//! [`crate::looper::LoopPlayer`] (wraps forever) and [`FileSource`] (plays a decoded
//! file once, optionally looping).

use std::time::Duration;

use crate::buffer::{OutputBlock, SampleBuffer};
use crate::config::check_duration;
use crate::error::{EngineError, Result};
use crate::gain::{BlockGain, GainRamp, LevelControl};

/// Capability interface for anything that renders into an [`OutputBlock`].
///
/// `produce_block`, `prepare` and `release` run on the audio thread: implementations must
/// not block, allocate or free.
pub trait AudioSource: Send {
    /// Called before streaming starts (and again if the stream is rebuilt).
    fn prepare(&mut self, _samples_per_block: usize, _sample_rate: u32) {}

    /// Fill the active region of `out` and advance the cursor.
    fn produce_block(&mut self, out: &mut OutputBlock<'_>);

    /// Called when streaming stops.
    fn release(&mut self) {}

    fn position(&self) -> usize;

    fn set_position(&mut self, frame: usize);

    fn total_frames(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> usize;

    /// Looping sources never finish.
    fn is_looping(&self) -> bool;

    /// `true` once a non-looping source has rendered its last frame.
    fn has_finished(&self) -> bool {
        !self.is_looping() && self.position() >= self.total_frames()
    }

    /// Check the source is playable under the `max` duration cap.
    fn validate(&self, max: Duration) -> Result<()> {
        if self.total_frames() > 0 && self.channel_count() == 0 {
            return Err(EngineError::invalid("non-empty source without channels"));
        }
        check_duration(self.total_frames(), self.sample_rate(), max)
    }
}

/// Copy `len` frames from `buffer` at `src_pos` into `out` at region offset `dst_offset`,
/// then apply `gain`.
///
/// Output channel `ch` reads source channel `ch % source_channels`, so a mono buffer fills
/// every output channel.
pub(crate) fn render_span(
    buffer: &SampleBuffer,
    out: &mut OutputBlock<'_>,
    dst_offset: usize,
    src_pos: usize,
    len: usize,
    gain: &BlockGain,
) {
    let src_channels = buffer.channel_count();
    if src_channels == 0 {
        out.clear_frames(dst_offset, len);
        return;
    }
    let unity = gain.is_flat() && gain.end() == 1.0;
    for ch in 0..out.channels() {
        let src = &buffer.channel(ch % src_channels)[src_pos..src_pos + len];
        out.copy_into_channel(ch, dst_offset, src);
        if !unity {
            out.scale_channel(ch, dst_offset, len, |i| gain.at(i));
        }
    }
}

/// Decoded file played from memory.
///
/// Without looping it renders silence after the last frame and reports
/// [`AudioSource::has_finished`].
pub struct FileSource {
    buffer: SampleBuffer,
    position: usize,
    looping: bool,
    level: LevelControl,
    ramp: GainRamp,
}

impl FileSource {
    pub fn new(buffer: SampleBuffer, level: LevelControl) -> Self {
        let ramp = GainRamp::new(level.get());
        Self {
            buffer,
            position: 0,
            looping: false,
            level,
            ramp,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl AudioSource for FileSource {
    fn produce_block(&mut self, out: &mut OutputBlock<'_>) {
        let frames = out.num_frames();
        let total = self.buffer.frames();
        let gain = self.ramp.begin(self.level.get(), frames);

        let mut offset = 0;
        while offset < frames {
            if self.position >= total {
                if self.looping && total > 0 {
                    self.position = 0;
                } else {
                    out.clear_frames(offset, frames - offset);
                    break;
                }
            }
            let n = (frames - offset).min(total - self.position);
            render_span(&self.buffer, out, offset, self.position, n, &gain);
            offset += n;
            self.position += n;
        }

        self.ramp.finish(gain);
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, frame: usize) {
        self.position = frame.min(self.buffer.frames());
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
        self.looping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(frames: usize) -> SampleBuffer {
        let samples: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        SampleBuffer::new(vec![samples], 48_000).unwrap()
    }

    #[test]
    fn file_source_zero_fills_after_end() {
        let mut src = FileSource::new(ramp_buffer(3), LevelControl::new(1.0));
        let mut data = [9.0f32; 5];
        src.produce_block(&mut OutputBlock::new(&mut data, 1));
        assert_eq!(data, [0.0, 1.0, 2.0, 0.0, 0.0]);
        assert!(src.has_finished());
    }

    #[test]
    fn file_source_loops_when_asked() {
        let mut src = FileSource::new(ramp_buffer(3), LevelControl::new(1.0)).looping(true);
        let mut data = [0.0f32; 7];
        src.produce_block(&mut OutputBlock::new(&mut data, 1));
        assert_eq!(data, [0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0]);
        assert_eq!(src.position(), 1);
        assert!(!src.has_finished());
    }

    #[test]
    fn set_position_is_clamped() {
        let mut src = FileSource::new(ramp_buffer(3), LevelControl::new(1.0));
        src.set_position(10);
        assert_eq!(src.position(), 3);
    }

    #[test]
    fn validate_applies_duration_cap() {
        let src = FileSource::new(
            SampleBuffer::new(vec![vec![0.0; 48_000 * 3]], 48_000).unwrap(),
            LevelControl::default(),
        );
        assert!(matches!(
            src.validate(Duration::from_secs(2)),
            Err(EngineError::UnsupportedDuration { .. })
        ));
        assert!(src.validate(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn empty_file_source_is_silent_and_finished() {
        let mut src = FileSource::new(SampleBuffer::empty(48_000), LevelControl::default()).looping(true);
        let mut data = [1.0f32; 4];
        src.produce_block(&mut OutputBlock::new(&mut data, 2));
        assert_eq!(data, [0.0; 4]);
    }
}
