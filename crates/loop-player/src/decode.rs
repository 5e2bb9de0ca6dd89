//! Whole-file decode stage.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - reject sources longer than the playable cap before decoding any packets
//! - decode every packet into one in-memory [`SampleBuffer`]
//!
//! Runs on the control thread (or a worker); the audio thread only ever sees the result.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer as InterleavedSamples;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::SampleBuffer;
use crate::config::check_duration;
use crate::error::{EngineError, Result};

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container/extension hint (best-effort).
    pub container: Option<String>,
    /// Duration from container metadata, when the container reports it.
    pub duration_ms: Option<u64>,
}

/// Result of a successful decode.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub buffer: SampleBuffer,
    pub info: SourceInfo,
}

/// Decode the file at `path`, rejecting anything longer than `max_duration`.
pub fn decode_file(path: &Path, max_duration: Duration) -> Result<DecodedAudio> {
    let file = File::open(path)?;

    let mut hint = Hint::new();
    let ext = path.extension().and_then(|e| e.to_str());
    if let Some(ext) = ext {
        hint.with_extension(ext);
    }

    let mut decoded = decode_media_source(Box::new(file), hint, max_duration)?;
    decoded.info.container = ext.map(str::to_ascii_lowercase);
    tracing::info!(
        path = %path.display(),
        frames = decoded.buffer.frames(),
        channels = decoded.buffer.channel_count(),
        rate_hz = decoded.buffer.sample_rate(),
        duration_ms = decoded.buffer.duration().as_millis() as u64,
        codec = decoded.info.codec.as_deref().unwrap_or("unknown"),
        "decoded"
    );
    Ok(decoded)
}

/// Decode an arbitrary Symphonia [`MediaSource`] fully into memory.
pub fn decode_media_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
    max_duration: Duration,
) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(map_symphonia_error)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| EngineError::UnsupportedFormat("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let (channels, rate) = stream_layout(&codec_params)?;

    if let Some(n_frames) = codec_params.n_frames {
        check_duration(usize::try_from(n_frames).unwrap_or(usize::MAX), rate, max_duration)?;
    }
    let max_frames = (max_duration.as_secs_f64() * rate as f64).floor() as usize;

    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        container: None,
        duration_ms: duration_ms_from_codec_params(&codec_params),
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(map_symphonia_error)?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(map_symphonia_error(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!(error = msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(map_symphonia_error(e)),
        };

        let mut samples = InterleavedSamples::<f32>::new(decoded.frames() as u64, *decoded.spec());
        samples.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(samples.samples());

        if interleaved.len() / channels > max_frames {
            check_duration(interleaved.len() / channels, rate, max_duration)?;
        }
    }

    let buffer = SampleBuffer::from_interleaved(&interleaved, channels, rate)?;
    check_duration(buffer.frames(), rate, max_duration)?;
    Ok(DecodedAudio { buffer, info })
}

/// Channel count and sample rate of the track; both must be known and non-zero.
fn stream_layout(params: &CodecParameters) -> Result<(usize, u32)> {
    let channels = params
        .channels
        .ok_or_else(|| EngineError::UnsupportedFormat("unknown channel layout".into()))?
        .count();
    if channels == 0 {
        return Err(EngineError::UnsupportedFormat("stream has no channels".into()));
    }
    let rate = params
        .sample_rate
        .filter(|r| *r > 0)
        .ok_or_else(|| EngineError::UnsupportedFormat("unknown sample rate".into()))?;
    Ok((channels, rate))
}

fn map_symphonia_error(err: SymphoniaError) -> EngineError {
    match err {
        SymphoniaError::IoError(e) => EngineError::Io(e),
        other => EngineError::UnsupportedFormat(other.to_string()),
    }
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label used for status output.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
