use rubato::{FftFixedIn, Resampler};

use crate::error::PrepError;

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Resample a mono buffer. Input is padded to whole chunks, the resampler
/// delay is skipped and the output trimmed to the exact expected length, so
/// frame-based consumers see a time-aligned waveform.
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>, PrepError> {
    if from_hz == 0 || to_hz == 0 {
        return Err(PrepError::invalid_config("sample rate must be non-zero"));
    }
    if from_hz == to_hz || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from_hz as usize, to_hz as usize, CHUNK, SUB_CHUNKS, 1)
        .map_err(|e| PrepError::runtime("create resampler", e))?;

    let expected_len = (samples.len() as f64 * to_hz as f64 / from_hz as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected_len + CHUNK);

    let mut pos = 0;
    // One extra zero-padded chunk flushes the tail past the filter delay.
    while pos < samples.len() + CHUNK {
        let end = (pos + CHUNK).min(samples.len());
        let mut chunk = vec![0.0f32; CHUNK];
        if pos < samples.len() {
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| PrepError::runtime("resample chunk", e))?;
        out.extend_from_slice(&frames[0]);
        pos += CHUNK;
    }

    let start = delay.min(out.len());
    let mut trimmed = out.split_off(start);
    trimmed.truncate(expected_len);
    if trimmed.len() < expected_len {
        trimmed.resize(expected_len, 0.0);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, seconds: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn identity_when_rates_match() {
        let input = sine(440.0, 16_000, 0.1);
        let out = resample(&input, 16_000, 16_000).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn downsample_48k_to_16k_has_exact_length() {
        let input = sine(440.0, 48_000, 1.0);
        let out = resample(&input, 48_000, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn downsample_preserves_energy_of_low_frequency_tone() {
        let input = sine(440.0, 48_000, 1.0);
        let out = resample(&input, 48_000, 16_000).unwrap();
        // Ignore the edges where the filter ramps in and out.
        let inner = &out[2_000..14_000];
        let rms = (inner.iter().map(|s| s * s).sum::<f32>() / inner.len() as f32).sqrt();
        let expected = 0.5 / 2.0f32.sqrt();
        assert!((rms - expected).abs() < 0.02, "rms {rms} vs {expected}");
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(resample(&[0.0; 10], 0, 16_000).is_err());
    }
}
