//! Cross-correlation pitch tracker with a 10 ms analysis step.
//!
//! Frames are analysed wherever a full correlation window fits; the caller
//! pads the resulting contour symmetrically onto the frame grid. Frames
//! whose best normalized correlation falls under the voicing threshold are
//! unvoiced (0 Hz).

use crate::config::F0Config;

const VOICING_THRESHOLD: f32 = 0.6;
const SILENCE_RMS: f32 = 1e-4;

pub fn pitch_cross_correlation(samples: &[f32], cfg: &F0Config) -> Vec<f32> {
    let sr = cfg.sample_rate_hz as f32;
    let lag_min = ((sr / cfg.f0_max_hz).floor() as usize).max(2);
    let lag_max = (sr / cfg.f0_min_hz).ceil() as usize;
    let seg = lag_max;
    let window = seg + lag_max;
    let step = cfg.hop_size;

    if samples.len() < window {
        return Vec::new();
    }

    let n_frames = (samples.len() - window) / step + 1;
    let mut contour = Vec::with_capacity(n_frames);
    for k in 0..n_frames {
        let start = k * step;
        contour.push(frame_pitch(
            &samples[start..start + window],
            seg,
            lag_min,
            lag_max,
            sr,
            cfg,
        ));
    }
    contour
}

fn frame_pitch(
    frame: &[f32],
    seg: usize,
    lag_min: usize,
    lag_max: usize,
    sr: f32,
    cfg: &F0Config,
) -> f32 {
    let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
    if rms < SILENCE_RMS {
        return 0.0;
    }

    let mut best_lag = 0usize;
    let mut best_corr = f32::MIN;
    for lag in lag_min..=lag_max {
        let corr = normalized_correlation(frame, lag, seg);
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }
    if best_corr < VOICING_THRESHOLD {
        return 0.0;
    }

    let refined = if best_lag > lag_min && best_lag < lag_max {
        let left = normalized_correlation(frame, best_lag - 1, seg);
        let right = normalized_correlation(frame, best_lag + 1, seg);
        best_lag as f32 + parabolic_offset(left, best_corr, right)
    } else {
        best_lag as f32
    };

    let f0 = sr / refined;
    if f0 < cfg.f0_min_hz || f0 > cfg.f0_max_hz {
        0.0
    } else {
        f0
    }
}

/// Correlation of `frame[..seg]` against itself shifted by `lag`, normalized
/// by the energies of both windows.
pub(crate) fn normalized_correlation(frame: &[f32], lag: usize, seg: usize) -> f32 {
    let a = &frame[..seg];
    let b = &frame[lag..lag + seg];
    let mut dot = 0.0f32;
    let mut ea = 0.0f32;
    let mut eb = 0.0f32;
    for i in 0..seg {
        dot += a[i] * b[i];
        ea += a[i] * a[i];
        eb += b[i] * b[i];
    }
    let norm = (ea * eb).sqrt();
    if norm <= f32::MIN_POSITIVE {
        0.0
    } else {
        dot / norm
    }
}

/// Vertex offset in [-0.5, 0.5] of the parabola through three equally
/// spaced correlation values.
pub(crate) fn parabolic_offset(left: f32, center: f32, right: f32) -> f32 {
    let denom = left - 2.0 * center + right;
    if denom.abs() <= f32::MIN_POSITIVE {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
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

    #[test]
    fn tracks_a_steady_sine() {
        let cfg = F0Config::default();
        let contour = pitch_cross_correlation(&sine(220.0, 16_000, 1.0), &cfg);
        assert!(!contour.is_empty());

        let voiced: Vec<f32> = contour.iter().copied().filter(|&f| f > 0.0).collect();
        assert!(voiced.len() * 10 >= contour.len() * 9, "mostly voiced");
        for f in voiced {
            assert!((f - 220.0).abs() < 3.0, "estimate {f} off 220 Hz");
        }
    }

    #[test]
    fn silence_is_unvoiced() {
        let cfg = F0Config::default();
        let contour = pitch_cross_correlation(&vec![0.0; 16_000], &cfg);
        assert!(contour.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn short_input_yields_an_empty_contour() {
        let cfg = F0Config::default();
        assert!(pitch_cross_correlation(&[0.1; 100], &cfg).is_empty());
    }

    #[test]
    fn parabolic_offset_stays_within_half_a_lag() {
        assert_eq!(parabolic_offset(0.5, 1.0, 0.5), 0.0);
        assert!(parabolic_offset(0.4, 1.0, 0.9) > 0.0);
        assert!(parabolic_offset(0.9, 1.0, 0.4) < 0.0);
        assert!(parabolic_offset(0.0, 0.0, 0.0).abs() <= 0.5);
    }
}
