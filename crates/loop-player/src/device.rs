//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config close to the source (rate first, then channel count)

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// What the loaded source would like from the device.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputPreference {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Choose the best output config for the preference.
///
/// Ranking: a rate at or below the target beats one above it, then the higher rate,
/// then an exact channel match, then the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    pref: OutputPreference,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), pref.sample_rate);
        let candidate = Candidate {
            below: pref.sample_rate.map(|t| rate <= t).unwrap_or(true),
            rate,
            channel_match: pref.channels.map(|c| c == range.channels()).unwrap_or(true),
            format_rank: sample_format_rank(range.sample_format()),
        };
        let replace = match &best {
            None => true,
            Some((current, _)) => candidate.is_better_than(current),
        };
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Picks the smallest size at or above `min_frames` (low latency, but not so small that
/// the callback overhead dominates). Returns `None` when the device only supports the
/// default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig, min_frames: u32) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(min_frames.clamp(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    below: bool,
    rate: u32,
    channel_match: bool,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate) -> bool {
        if self.below != other.below {
            self.below
        } else if self.rate != other.rate {
            self.rate > other.rate
        } else if self.channel_match != other.channel_match {
            self.channel_match
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) => target.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
