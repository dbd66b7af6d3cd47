pub mod highpass;
pub mod resample;

use std::path::Path;

use claxon::FlacReader;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::PrepError;

/// Decoded mono audio at its native rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

/// Decode a `.wav` or `.flac` file to mono f32, mixing down channels.
pub fn decode_audio(path: &Path) -> Result<DecodedAudio, PrepError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("wav") => decode_wav(path),
        Some("flac") => decode_flac(path),
        _ => Err(PrepError::decode(path, "unsupported extension")),
    }
}

/// Decode and resample to `target_rate_hz` in one step.
pub fn load_audio(path: &Path, target_rate_hz: u32) -> Result<Vec<f32>, PrepError> {
    let decoded = decode_audio(path)?;
    resample::resample(&decoded.samples, decoded.sample_rate_hz, target_rate_hz)
}

fn decode_wav(path: &Path) -> Result<DecodedAudio, PrepError> {
    let mut reader = WavReader::open(path).map_err(|e| PrepError::decode(path, e))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| PrepError::decode(path, e))?,
        (SampleFormat::Int, bits) if bits <= 32 => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| PrepError::decode(path, e))?
        }
        (format, bits) => {
            return Err(PrepError::decode(
                path,
                format!("unsupported wav format {format:?}/{bits}bit"),
            ))
        }
    };

    Ok(DecodedAudio {
        samples: mixdown(&interleaved, channels),
        sample_rate_hz: spec.sample_rate,
    })
}

fn decode_flac(path: &Path) -> Result<DecodedAudio, PrepError> {
    let mut reader = FlacReader::open(path).map_err(|e| PrepError::decode(path, e))?;
    let info = reader.streaminfo();
    let channels = info.channels as usize;
    let scale = (1i64 << (info.bits_per_sample - 1)) as f32;

    let mut interleaved = Vec::new();
    for sample in reader.samples() {
        let s = sample.map_err(|e| PrepError::decode(path, e))?;
        interleaved.push(s as f32 / scale);
    }

    Ok(DecodedAudio {
        samples: mixdown(&interleaved, channels),
        sample_rate_hz: info.sample_rate,
    })
}

fn mixdown(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Write mono f32 samples as a 32-bit float WAV.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate_hz: u32) -> Result<(), PrepError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|e| PrepError::runtime("create wav", e))?;
    for &s in samples {
        writer
            .write_sample(s)
            .map_err(|e| PrepError::runtime("write wav sample", e))?;
    }
    writer
        .finalize()
        .map_err(|e| PrepError::runtime("finalize wav", e))
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}
