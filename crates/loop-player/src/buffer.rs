//! Sample storage and the output block handed to sources by the audio callback.
//!
//! [`SampleBuffer`] is planar (one `Vec<f32>` per channel) so a source can copy a run of
//! frames from one channel without striding. [`OutputBlock`] is interleaved because that
//! is what the output device hands us.

use std::time::Duration;

use crate::error::{EngineError, Result};

/// Decoded audio held fully in memory.
///
/// Immutable once built; a new load replaces the whole buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build from one vector per channel.
    ///
    /// All channels must have the same length. Zero channels is only valid as an empty
    /// buffer, which is what `SampleBuffer::new(vec![], rate)` gives you.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, ch)) = channels.iter().enumerate().find(|(_, c)| c.len() != frames) {
            return Err(EngineError::invalid(format!(
                "channel {idx} has {} frames, expected {frames}",
                ch.len()
            )));
        }
        Ok(Self {
            channels,
            frames,
            sample_rate,
        })
    }

    /// Build from interleaved samples (`frame0[ch0], frame0[ch1], ...`).
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            if samples.is_empty() {
                return Ok(Self::empty(sample_rate));
            }
            return Err(EngineError::invalid("zero channels with non-empty sample data"));
        }
        if samples.len() % channel_count != 0 {
            return Err(EngineError::invalid(format!(
                "{} samples is not a whole number of {channel_count}-channel frames",
                samples.len()
            )));
        }
        let frames = samples.len() / channel_count;
        let mut channels: Vec<Vec<f32>> = (0..channel_count)
            .map(|_| Vec::with_capacity(frames))
            .collect();
        for frame in samples.chunks_exact(channel_count) {
            for (dst, &s) in channels.iter_mut().zip(frame) {
                dst.push(s);
            }
        }
        Ok(Self {
            channels,
            frames,
            sample_rate,
        })
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self {
            channels: Vec::new(),
            frames: 0,
            sample_rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Samples of one channel. Panics if `channel` is out of range.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    /// Playback length; zero when empty or when the sample rate is unknown.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// Structural checks shared by every consumer: samples need at least one channel.
    pub fn validate(&self) -> Result<()> {
        if self.frames > 0 && self.channels.is_empty() {
            return Err(EngineError::invalid("non-empty buffer without channels"));
        }
        Ok(())
    }
}

/// Interleaved output buffer plus the frame region a source must fill.
///
/// Mirrors the host contract "here is a buffer, fill frames `start..start + len`".
#[derive(Debug)]
pub struct OutputBlock<'a> {
    data: &'a mut [f32],
    channels: usize,
    start_frame: usize,
    num_frames: usize,
}

impl<'a> OutputBlock<'a> {
    /// Wrap a whole interleaved buffer. Trailing samples that do not form a full frame
    /// are left untouched.
    pub fn new(data: &'a mut [f32], channels: usize) -> Self {
        let channels = channels.max(1);
        let num_frames = data.len() / channels;
        Self {
            data,
            channels,
            start_frame: 0,
            num_frames,
        }
    }

    /// Restrict the active region; clamped to the buffer.
    pub fn with_region(mut self, start_frame: usize, num_frames: usize) -> Self {
        let total = self.data.len() / self.channels;
        self.start_frame = start_frame.min(total);
        self.num_frames = num_frames.min(total - self.start_frame);
        self
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// First frame of the active region.
    pub fn start_frame(&self) -> usize {
        self.start_frame
    }

    /// Frames in the active region.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Zero the active region.
    pub fn clear(&mut self) {
        let (start, end) = self.sample_range(0, self.num_frames);
        self.data[start..end].fill(0.0);
    }

    /// Zero `len` frames starting at region-relative frame `offset`.
    pub fn clear_frames(&mut self, offset: usize, len: usize) {
        let (start, end) = self.sample_range(offset, len);
        self.data[start..end].fill(0.0);
    }

    /// Copy `src` into `channel` at region-relative frame `offset`.
    pub fn copy_into_channel(&mut self, channel: usize, offset: usize, src: &[f32]) {
        let base = (self.start_frame + offset) * self.channels + channel;
        for (i, &s) in src.iter().enumerate() {
            self.data[base + i * self.channels] = s;
        }
    }

    /// Multiply `len` frames of `channel` starting at `offset` by a gain computed per frame.
    pub fn scale_channel(&mut self, channel: usize, offset: usize, len: usize, gain_at: impl Fn(usize) -> f32) {
        let base = (self.start_frame + offset) * self.channels + channel;
        for i in 0..len {
            self.data[base + i * self.channels] *= gain_at(offset + i);
        }
    }

    fn sample_range(&self, offset: usize, len: usize) -> (usize, usize) {
        let offset = offset.min(self.num_frames);
        let len = len.min(self.num_frames - offset);
        let start = (self.start_frame + offset) * self.channels;
        (start, start + len * self.channels)
    }
}
