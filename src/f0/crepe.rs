//! Post-processing for the two CREPE-backed variants.
//!
//! Both share one lazily loaded model session. `compute_crepe` runs the
//! model on the pipeline hop and cleans the contour with short filters;
//! `compute_mangio` normalizes the input level, runs the model on a
//! caller-chosen hop and resamples the contour back onto the frame grid.

use crate::config::F0Config;
use crate::error::PrepError;
use crate::f0::LazyPitchModel;

const PERIODICITY_THRESHOLD: f32 = 0.1;
const MANGIO_INVALID_BELOW: f32 = 0.001;
const NORMALIZE_QUANTILE: f64 = 0.999;

/// Whole-waveform inference on the pipeline hop, then a 3-tap median on the
/// periodicity and a 3-tap mean on the contour; low-confidence frames are
/// unvoiced.
pub fn compute_crepe(
    session: &LazyPitchModel,
    samples: &[f32],
    cfg: &F0Config,
    batch_size: usize,
) -> Result<Vec<f32>, PrepError> {
    let out = session.predict(samples, cfg.sample_rate_hz, cfg.hop_size, batch_size.max(1))?;
    let periodicity = median3(&out.periodicity);
    let mut f0 = mean3(&out.f0_hz);
    for (f, pd) in f0.iter_mut().zip(&periodicity) {
        if *pd < PERIODICITY_THRESHOLD {
            *f = 0.0;
        }
    }
    Ok(f0)
}

/// Level-normalized inference on `hop_length` samples per frame, with the
/// contour linearly interpolated from its valid samples back onto the
/// pipeline frame grid. Gaps outside the valid span stay at zero.
pub fn compute_mangio(
    session: &LazyPitchModel,
    samples: &[f32],
    cfg: &F0Config,
    hop_length: usize,
) -> Result<Vec<f32>, PrepError> {
    let hop_length = hop_length.max(1);
    let scale = abs_quantile(samples, NORMALIZE_QUANTILE);
    let normalized: Vec<f32> = if scale > f32::MIN_POSITIVE {
        samples.iter().map(|&s| s / scale).collect()
    } else {
        samples.to_vec()
    };

    let out = session.predict(&normalized, cfg.sample_rate_hz, hop_length, 1)?;
    let target_len = cfg.frame_count(samples.len());
    Ok(resample_valid(&out.f0_hz, target_len))
}

/// Upper quantile of the absolute amplitude, linear interpolation between
/// order statistics.
fn abs_quantile(samples: &[f32], q: f64) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut mags: Vec<f32> = samples.iter().map(|s| s.abs()).collect();
    mags.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (mags.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    mags[lo] * (1.0 - frac) + mags[hi] * frac
}

/// Map a source contour onto `target_len` frames, interpolating only between
/// valid (>= MANGIO_INVALID_BELOW) samples; positions before the first or
/// after the last valid sample become 0.
fn resample_valid(source: &[f32], target_len: usize) -> Vec<f32> {
    let valid: Vec<(usize, f32)> = source
        .iter()
        .enumerate()
        .filter(|(_, &v)| v >= MANGIO_INVALID_BELOW)
        .map(|(i, &v)| (i, v))
        .collect();
    if valid.is_empty() || target_len == 0 {
        return vec![0.0; target_len];
    }

    let scale = source.len() as f64 / target_len as f64;
    let first = valid[0].0 as f64;
    let last = valid[valid.len() - 1].0 as f64;

    (0..target_len)
        .map(|t| {
            let pos = t as f64 * scale;
            if pos < first || pos > last {
                return 0.0;
            }
            // Binary search the valid pair straddling pos.
            let idx = valid.partition_point(|&(i, _)| (i as f64) <= pos);
            if idx == 0 {
                return valid[0].1;
            }
            let (i0, v0) = valid[idx - 1];
            if idx == valid.len() {
                return v0;
            }
            let (i1, v1) = valid[idx];
            let frac = ((pos - i0 as f64) / (i1 as f64 - i0 as f64)) as f32;
            v0 * (1.0 - frac) + v1 * frac
        })
        .collect()
}

fn median3(values: &[f32]) -> Vec<f32> {
    if values.len() < 3 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let mut w = [
                values[i.saturating_sub(1)],
                values[i],
                values[(i + 1).min(values.len() - 1)],
            ];
            w.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
            w[1]
        })
        .collect()
}

fn mean3(values: &[f32]) -> Vec<f32> {
    if values.len() < 3 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let a = values[i.saturating_sub(1)];
            let b = values[i];
            let c = values[(i + 1).min(values.len() - 1)];
            (a + b + c) / 3.0
        })
        .collect()
}
