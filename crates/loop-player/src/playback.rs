//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and moves the [`TransportEngine`] into its callback.
//! The callback:
//! - renders the engine into a preallocated `f32` scratch buffer, chunk by chunk
//! - converts `f32` samples to the device sample format
//!
//! The engine is prepared before the stream starts and released when the callback is
//! dropped with the stream.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::buffer::OutputBlock;
use crate::config::EngineConfig;
use crate::device::{self, OutputPreference};
use crate::transport::TransportEngine;

/// A running output stream plus what was negotiated with the device.
pub struct ActiveOutput {
    /// Dropping the stream stops playback and releases the engine.
    pub stream: cpal::Stream,
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: cpal::SampleFormat,
}

/// Pick a device and config, build the stream around `engine` and start it.
pub fn start_output(
    host: &cpal::Host,
    device_needle: Option<&str>,
    pref: OutputPreference,
    engine: TransportEngine,
    cfg: &EngineConfig,
) -> Result<ActiveOutput> {
    let device = device::pick_device(host, device_needle)?;
    let device_name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let config = device::pick_output_config(&device, pref)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config, 512) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        device = %device_name,
        output_rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        buffer_size = ?stream_config.buffer_size,
        sample_format = ?config.sample_format(),
        "device output config"
    );
    if let Some(rate) = pref.sample_rate {
        if rate != stream_config.sample_rate {
            tracing::warn!(
                source_rate_hz = rate,
                output_rate_hz = stream_config.sample_rate,
                "device does not support the source rate; playback pitch will shift"
            );
        }
    }

    let stream = build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        engine,
        cfg.render_chunk_frames,
    )?;
    stream.play().context("start output stream")?;

    Ok(ActiveOutput {
        stream,
        device: device_name,
        sample_rate: stream_config.sample_rate,
        channels: stream_config.channels,
        sample_format: config.sample_format(),
    })
}

/// Build a CPAL output stream that renders `engine`.
///
/// ## Real-time constraints
/// The callback owns the engine outright: no locks, no allocation, no logging.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    engine: TransportEngine,
    render_chunk_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, engine, render_chunk_frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, engine, render_chunk_frames),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, engine, render_chunk_frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, engine, render_chunk_frames),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: TransportEngine,
    render_chunk_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let block_frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames as usize,
        cpal::BufferSize::Default => render_chunk_frames,
    };
    let mut renderer = EngineRenderer::new(engine, channels, render_chunk_frames);
    renderer.engine.prepare(block_frames, config.sample_rate);

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| renderer.render(data),
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Callback state: the engine plus an `f32` scratch buffer sized up front.
struct EngineRenderer {
    engine: TransportEngine,
    scratch: Vec<f32>,
    channels: usize,
}

impl EngineRenderer {
    fn new(engine: TransportEngine, channels: usize, chunk_frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            engine,
            scratch: vec![0.0; chunk_frames.max(1) * channels],
            channels,
        }
    }

    /// Fill `data` (interleaved, device format) from the engine.
    fn render<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let whole = data.len() - data.len() % self.channels;
        let (frames, tail) = data.split_at_mut(whole);
        for chunk in frames.chunks_mut(self.scratch.len()) {
            let scratch = &mut self.scratch[..chunk.len()];
            self.engine
                .produce_block(&mut OutputBlock::new(scratch, self.channels));
            for (dst, &s) in chunk.iter_mut().zip(scratch.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(s);
            }
        }
        for dst in tail {
            *dst = <T as cpal::Sample>::from_sample::<f32>(0.0);
        }
    }
}

impl Drop for EngineRenderer {
    fn drop(&mut self) {
        self.engine.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::gain::LevelControl;
    use crate::looper::LoopPlayer;
    use crate::transport::TransportController;
    use loop_player_types::TransportState;
    use std::time::Duration;

    fn playing_engine(frames: usize) -> (TransportController, TransportEngine) {
        let (mut ctl, engine) =
            TransportController::new(&EngineConfig::default(), LevelControl::new(1.0)).unwrap();
        let samples = (0..frames).map(|i| i as f32 / frames as f32).collect();
        let player = LoopPlayer::new(ctl.level_control(), Duration::from_secs(2))
            .with_buffer(SampleBuffer::new(vec![samples], 48_000).unwrap())
            .unwrap();
        ctl.open_source(player).unwrap();
        ctl.play().unwrap();
        (ctl, engine)
    }

    #[test]
    fn renders_in_chunks_smaller_than_the_device_buffer() {
        let (ctl, engine) = playing_engine(5);
        let mut renderer = EngineRenderer::new(engine, 2, 3);

        let mut data = [0.0f32; 14];
        renderer.render(&mut data);

        let left: Vec<f32> = data.chunks_exact(2).map(|f| f[0]).collect();
        let expected: Vec<f32> = (0..7).map(|i| (i % 5) as f32 / 5.0).collect();
        assert_eq!(left, expected);
        assert_eq!(ctl.state(), TransportState::Playing);
        assert_eq!(ctl.snapshot().position_frames, 2);
    }

    #[test]
    fn converts_to_integer_formats() {
        let (_ctl, engine) = playing_engine(4);
        let mut renderer = EngineRenderer::new(engine, 1, 16);

        let mut data = [0i16; 4];
        renderer.render(&mut data);
        assert_eq!(data[0], 0);
        assert!(data[2] > 0);
    }

    #[test]
    fn partial_trailing_frame_is_silenced() {
        let (_ctl, engine) = playing_engine(4);
        let mut renderer = EngineRenderer::new(engine, 2, 16);

        let mut data = [9.0f32; 5];
        renderer.render(&mut data);
        assert_eq!(data[4], 0.0);
    }
}
