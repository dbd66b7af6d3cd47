//! 256-bin mel quantization of a continuous contour.
//!
//! Bin 0 is reserved for unvoiced frames by the downstream trainer, so
//! voiced values map onto [1, 255]. The range check at the end is
//! unconditional; an out-of-range bin silently corrupts the trainset.

use crate::config::{hz_to_mel, F0Config};

pub fn coarse_f0(f0_hz: &[f32], cfg: &F0Config) -> Vec<i64> {
    let mel_min = cfg.mel_min();
    let mel_max = cfg.mel_max();
    let top_bin = (cfg.f0_bins - 1) as f32;

    let coarse: Vec<i64> = f0_hz
        .iter()
        .map(|&hz| {
            let mel = hz_to_mel(hz);
            let mut scaled = if mel > 0.0 {
                (mel - mel_min) * (top_bin - 1.0) / (mel_max - mel_min) + 1.0
            } else {
                mel
            };
            if scaled <= 1.0 {
                scaled = 1.0;
            }
            if scaled > top_bin {
                scaled = top_bin;
            }
            scaled.round() as i64
        })
        .collect();

    for &bin in &coarse {
        assert!(
            (1..=(cfg.f0_bins as i64 - 1)).contains(&bin),
            "coarse f0 bin {bin} outside [1, {}]",
            cfg.f0_bins - 1
        );
    }
    coarse
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvoiced_frames_land_in_bin_one() {
        let cfg = F0Config::default();
        assert_eq!(coarse_f0(&[0.0, 0.0], &cfg), vec![1, 1]);
    }

    #[test]
    fn range_endpoints_map_to_the_extreme_bins() {
        let cfg = F0Config::default();
        let bins = coarse_f0(&[cfg.f0_min_hz, cfg.f0_max_hz], &cfg);
        assert_eq!(bins, vec![1, 255]);
    }

    #[test]
    fn quantization_is_monotonic_in_frequency() {
        let cfg = F0Config::default();
        let freqs: Vec<f32> = (0..200).map(|i| 50.0 + i as f32 * 5.0).collect();
        let bins = coarse_f0(&freqs, &cfg);
        for pair in bins.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(bins.iter().all(|&b| (1..=255).contains(&b)));
    }

    #[test]
    fn out_of_range_input_is_clamped_not_rejected() {
        let cfg = F0Config::default();
        let bins = coarse_f0(&[20.0, 4000.0], &cfg);
        assert_eq!(bins[0], 1);
        assert_eq!(bins[1], 255);
    }
}
