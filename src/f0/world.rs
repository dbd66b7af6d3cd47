//! Time-domain estimators with a shared refinement pass.
//!
//! `harvest` searches the full lag range densely and median-smooths the raw
//! candidates; `dio` searches a decimated signal and is roughly 4x cheaper.
//! Both finish with the same refinement: a narrow re-search around the
//! candidate period on the full-rate signal with parabolic lag
//! interpolation. Output length is exactly the frame count, no padding.

use crate::config::F0Config;
use crate::f0::ac::{normalized_correlation, parabolic_offset};

const HARVEST_THRESHOLD: f32 = 0.3;
const DIO_THRESHOLD: f32 = 0.25;
const REFINE_THRESHOLD: f32 = 0.2;
const DIO_DECIMATION: usize = 4;
const SILENCE_RMS: f32 = 1e-4;

pub fn harvest(samples: &[f32], cfg: &F0Config) -> Vec<f32> {
    let sr = cfg.sample_rate_hz as f32;
    let lag_min = ((sr / cfg.f0_max_hz).floor() as usize).max(2);
    let lag_max = (sr / cfg.f0_min_hz).ceil() as usize;

    let raw = candidate_contour(samples, cfg.hop_size, lag_min, lag_max, 1, HARVEST_THRESHOLD);
    let smoothed = median3(&raw);
    let in_hz: Vec<f32> = smoothed
        .iter()
        .map(|&lag| if lag > 0.0 { sr / lag } else { 0.0 })
        .collect();
    refine(samples, &in_hz, cfg)
}

pub fn dio(samples: &[f32], cfg: &F0Config) -> Vec<f32> {
    let decimated = decimate(samples, DIO_DECIMATION);
    let sr = cfg.sample_rate_hz as f32;
    let dec_sr = sr / DIO_DECIMATION as f32;
    let lag_min = ((dec_sr / cfg.f0_max_hz).floor() as usize).max(2);
    let lag_max = (dec_sr / cfg.f0_min_hz).ceil() as usize;

    let hop = cfg.hop_size / DIO_DECIMATION;
    let raw = candidate_contour(&decimated, hop, lag_min, lag_max, 1, DIO_THRESHOLD);
    let mut in_hz: Vec<f32> = raw
        .iter()
        .map(|&lag| if lag > 0.0 { dec_sr / lag } else { 0.0 })
        .collect();
    // Decimated hop drift can leave the coarse contour a frame short.
    in_hz.resize(cfg.frame_count(samples.len()), 0.0);
    refine(samples, &in_hz, cfg)
}

/// Best correlation lag per frame, 0.0 where unvoiced. Frame starts are
/// clamped so the contour always has `len / hop` entries.
fn candidate_contour(
    samples: &[f32],
    hop: usize,
    lag_min: usize,
    lag_max: usize,
    lag_step: usize,
    threshold: f32,
) -> Vec<f32> {
    let n_frames = samples.len() / hop.max(1);
    let seg = lag_max;
    let window = seg + lag_max;
    if samples.len() < window {
        return vec![0.0; n_frames];
    }

    let mut contour = Vec::with_capacity(n_frames);
    for k in 0..n_frames {
        let start = (k * hop).min(samples.len() - window);
        let frame = &samples[start..start + window];
        contour.push(best_lag(frame, seg, lag_min, lag_max, lag_step, threshold));
    }
    contour
}

fn best_lag(
    frame: &[f32],
    seg: usize,
    lag_min: usize,
    lag_max: usize,
    lag_step: usize,
    threshold: f32,
) -> f32 {
    let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
    if rms < SILENCE_RMS {
        return 0.0;
    }

    let mut best = 0usize;
    let mut best_corr = f32::MIN;
    let mut lag = lag_min;
    while lag <= lag_max {
        let corr = normalized_correlation(frame, lag, seg);
        if corr > best_corr {
            best_corr = corr;
            best = lag;
        }
        lag += lag_step;
    }
    if best_corr < threshold {
        0.0
    } else {
        best as f32
    }
}

/// Narrow re-search around each voiced candidate on the full-rate signal,
/// +-20% of the candidate period, with parabolic lag interpolation.
fn refine(samples: &[f32], contour_hz: &[f32], cfg: &F0Config) -> Vec<f32> {
    let sr = cfg.sample_rate_hz as f32;
    let abs_lag_max = (sr / cfg.f0_min_hz).ceil() as usize;
    let abs_lag_min = ((sr / cfg.f0_max_hz).floor() as usize).max(2);

    contour_hz
        .iter()
        .enumerate()
        .map(|(k, &hz)| {
            if hz <= 0.0 {
                return 0.0;
            }
            let center_lag = sr / hz;
            let lag_min = ((center_lag * 0.8) as usize).max(abs_lag_min);
            let lag_max = ((center_lag * 1.2).ceil() as usize).min(abs_lag_max);
            if lag_min >= lag_max {
                return hz;
            }

            let seg = abs_lag_max;
            let window = seg + abs_lag_max;
            if samples.len() < window {
                return hz;
            }
            let start = (k * cfg.hop_size).min(samples.len() - window);
            let frame = &samples[start..start + window];

            let mut best = lag_min;
            let mut best_corr = f32::MIN;
            for lag in lag_min..=lag_max {
                let corr = normalized_correlation(frame, lag, seg);
                if corr > best_corr {
                    best_corr = corr;
                    best = lag;
                }
            }
            if best_corr < REFINE_THRESHOLD {
                return hz;
            }
            let refined = if best > lag_min && best < lag_max {
                let left = normalized_correlation(frame, best - 1, seg);
                let right = normalized_correlation(frame, best + 1, seg);
                best as f32 + parabolic_offset(left, best_corr, right)
            } else {
                best as f32
            };
            (sr / refined).clamp(cfg.f0_min_hz, cfg.f0_max_hz)
        })
        .collect()
}

fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    samples
        .chunks(factor)
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

/// 3-tap median with edge replication; voiced/unvoiced boundaries count as
/// values, which snips single-frame spikes.
fn median3(contour: &[f32]) -> Vec<f32> {
    if contour.len() < 3 {
        return contour.to_vec();
    }
    (0..contour.len())
        .map(|i| {
            let a = contour[i.saturating_sub(1)];
            let b = contour[i];
            let c = contour[(i + 1).min(contour.len() - 1)];
            let mut w = [a, b, c];
            w.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
            w[1]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: u32, seconds: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn median_voiced(contour: &[f32]) -> f32 {
        let mut voiced: Vec<f32> = contour.iter().copied().filter(|&f| f > 0.0).collect();
        assert!(!voiced.is_empty());
        voiced.sort_by(|a, b| a.partial_cmp(b).unwrap());
        voiced[voiced.len() / 2]
    }

    #[test]
    fn harvest_tracks_a_steady_sine_at_full_length() {
        let cfg = F0Config::default();
        let samples = sine(220.0, 16_000, 1.0);
        let contour = harvest(&samples, &cfg);
        assert_eq!(contour.len(), cfg.frame_count(samples.len()));
        assert!((median_voiced(&contour) - 220.0).abs() < 3.0);
    }

    #[test]
    fn dio_tracks_a_steady_sine_at_full_length() {
        let cfg = F0Config::default();
        let samples = sine(220.0, 16_000, 1.0);
        let contour = dio(&samples, &cfg);
        assert_eq!(contour.len(), cfg.frame_count(samples.len()));
        assert!((median_voiced(&contour) - 220.0).abs() < 4.0);
    }

    #[test]
    fn silence_stays_unvoiced_through_refinement() {
        let cfg = F0Config::default();
        let samples = vec![0.0f32; 16_000];
        assert!(harvest(&samples, &cfg).iter().all(|&f| f == 0.0));
        assert!(dio(&samples, &cfg).iter().all(|&f| f == 0.0));
    }

    #[test]
    fn median3_snips_single_frame_spikes() {
        let smoothed = median3(&[100.0, 100.0, 400.0, 100.0, 100.0]);
        assert_eq!(smoothed, vec![100.0, 100.0, 100.0, 100.0, 100.0]);
    }

    #[test]
    fn decimation_averages_whole_groups() {
        assert_eq!(decimate(&[1.0, 3.0, 5.0, 7.0, 9.0], 2), vec![2.0, 6.0, 9.0]);
    }
}
