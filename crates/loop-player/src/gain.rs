//! Output level: a lock-free target written by the control thread, and a per-block ramp
//! applied by the audio callback so level changes never click.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Shared target level in `[0, 1]`.
///
/// Stored as `f32` bits in an `AtomicU32`. Cloning is one `Arc` increment; every clone
/// sees the same level.
#[derive(Clone)]
pub struct LevelControl {
    bits: Arc<AtomicU32>,
}

impl LevelControl {
    pub fn new(level: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(clamp_level(level).to_bits())),
        }
    }

    /// Store a new target. Out-of-range values are clamped, NaN becomes silence.
    pub fn set(&self, level: f32) {
        self.bits.store(clamp_level(level).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for LevelControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl fmt::Debug for LevelControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelControl").field("level", &self.get()).finish()
    }
}

fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, 1.0)
}

/// Gain applied across one block: linear from `start` to `end` over `frames`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockGain {
    start: f32,
    end: f32,
    frames: usize,
}

impl BlockGain {
    /// Gain for block-relative frame `i`: `start + (end - start) * i / frames`.
    #[inline]
    pub fn at(&self, i: usize) -> f32 {
        if self.frames == 0 {
            return self.end;
        }
        self.start + (self.end - self.start) * (i as f32 / self.frames as f32)
    }

    pub fn is_flat(&self) -> bool {
        self.start == self.end
    }

    pub fn end(&self) -> f32 {
        self.end
    }
}

/// Audio-thread half of the level: remembers the level the previous block ended on.
#[derive(Clone, Debug)]
pub struct GainRamp {
    previous: f32,
}

impl GainRamp {
    pub fn new(initial: f32) -> Self {
        Self {
            previous: clamp_level(initial),
        }
    }

    /// Ramp for a block of `frames` heading to `target`.
    ///
    /// Levels within float noise of the previous one are treated as unchanged so a
    /// steady level never produces a tiny ramp.
    pub fn begin(&self, target: f32, frames: usize) -> BlockGain {
        let start = if approximately_equal(target, self.previous) {
            target
        } else {
            self.previous
        };
        BlockGain {
            start,
            end: target,
            frames,
        }
    }

    /// Record the level the block ended on.
    pub fn finish(&mut self, gain: BlockGain) {
        self.previous = gain.end;
    }

    pub fn previous(&self) -> f32 {
        self.previous
    }
}

fn approximately_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= f32::EPSILON * a.abs().max(b.abs()).max(1.0)
}
