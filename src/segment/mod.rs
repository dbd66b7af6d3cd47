//! Silence-aware segmentation.
//!
//! Works on a framed RMS envelope: runs of frames below a dB threshold are
//! candidate cut regions, with hysteresis so that short dips do not split a
//! phrase and long segments are not glued together by long silences. Up to
//! `max_sil_kept` frames of silence survive at segment edges so transitions
//! stay natural.

use crate::config::SlicerParams;
use crate::error::PrepError;

pub struct Slicer {
    /// Linear RMS threshold below which a frame counts as silent.
    threshold: f32,
    hop_size: usize,
    win_size: usize,
    /// Minimum segment length, in frames.
    min_length: usize,
    /// Minimum silence run that may be cut, in frames.
    min_interval: usize,
    /// Maximum silence kept around a cut, in frames.
    max_sil_kept: usize,
}

impl Slicer {
    pub fn new(sample_rate_hz: u32, params: &SlicerParams) -> Result<Self, PrepError> {
        if !(params.min_length_ms >= params.min_interval_ms
            && params.min_interval_ms >= params.hop_size_ms)
        {
            return Err(PrepError::invalid_config(
                "slicer requires min_length >= min_interval >= hop_size",
            ));
        }
        if params.max_sil_kept_ms < params.hop_size_ms {
            return Err(PrepError::invalid_config(
                "slicer requires max_sil_kept >= hop_size",
            ));
        }

        let sr = sample_rate_hz as f32;
        let min_interval_samples = sr * params.min_interval_ms / 1000.0;
        let hop_size = (sr * params.hop_size_ms / 1000.0).round() as usize;
        let win_size = (min_interval_samples.round() as usize).min(4 * hop_size);
        Ok(Self {
            threshold: 10f32.powf(params.threshold_db / 20.0),
            hop_size,
            win_size,
            min_length: (sr * params.min_length_ms / 1000.0 / hop_size as f32).round() as usize,
            min_interval: (min_interval_samples / hop_size as f32).round() as usize,
            max_sil_kept: (sr * params.max_sil_kept_ms / 1000.0 / hop_size as f32).round() as usize,
        })
    }

    /// Split a waveform at silences. Finite and re-iterable; segments contain
    /// voiced audio with at most `max_sil_kept` frames of silence at edges.
    pub fn slice(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let total_ceil_frames = samples.len().div_ceil(self.hop_size);
        if total_ceil_frames <= self.min_length {
            return vec![samples.to_vec()];
        }

        let rms = framed_rms(samples, self.win_size, self.hop_size);
        let total_frames = rms.len();

        let mut sil_tags: Vec<(usize, usize)> = Vec::new();
        let mut silence_start: Option<usize> = None;
        let mut clip_start = 0usize;

        for (i, &level) in rms.iter().enumerate() {
            if level < self.threshold {
                if silence_start.is_none() {
                    silence_start = Some(i);
                }
                continue;
            }
            let Some(sil_start) = silence_start else {
                continue;
            };

            let is_leading_silence = sil_start == 0 && i > self.max_sil_kept;
            let need_slice_middle =
                i - sil_start >= self.min_interval && i - clip_start >= self.min_length;
            if !is_leading_silence && !need_slice_middle {
                silence_start = None;
                continue;
            }

            if i - sil_start <= self.max_sil_kept {
                let pos = argmin(&rms[sil_start..=i]) + sil_start;
                if sil_start == 0 {
                    sil_tags.push((0, pos));
                } else {
                    sil_tags.push((pos, pos));
                }
                clip_start = pos;
            } else if i - sil_start <= self.max_sil_kept * 2 {
                let lo = i - self.max_sil_kept;
                let hi = (sil_start + self.max_sil_kept).min(total_frames - 1);
                let pos = argmin(&rms[lo..=hi]) + lo;
                let pos_l = argmin(&rms[sil_start..=sil_start + self.max_sil_kept]) + sil_start;
                let pos_r = argmin(&rms[i - self.max_sil_kept..=i]) + i - self.max_sil_kept;
                if sil_start == 0 {
                    sil_tags.push((0, pos_r));
                    clip_start = pos_r;
                } else {
                    sil_tags.push((pos_l.min(pos), pos_r.max(pos)));
                    clip_start = pos_r.max(pos);
                }
            } else {
                let pos_l = argmin(&rms[sil_start..=sil_start + self.max_sil_kept]) + sil_start;
                let pos_r = argmin(&rms[i - self.max_sil_kept..=i]) + i - self.max_sil_kept;
                if sil_start == 0 {
                    sil_tags.push((0, pos_r));
                } else {
                    sil_tags.push((pos_l, pos_r));
                }
                clip_start = pos_r;
            }
            silence_start = None;
        }

        // Trailing silence.
        if let Some(sil_start) = silence_start {
            if total_frames - sil_start >= self.min_interval {
                let silence_end = (sil_start + self.max_sil_kept).min(total_frames - 1);
                let pos = argmin(&rms[sil_start..=silence_end]) + sil_start;
                sil_tags.push((pos, total_frames + 1));
            }
        }

        if sil_tags.is_empty() {
            return vec![samples.to_vec()];
        }

        let mut chunks = Vec::new();
        if sil_tags[0].0 > 0 {
            chunks.push(self.apply_slice(samples, 0, sil_tags[0].0));
        }
        for w in sil_tags.windows(2) {
            chunks.push(self.apply_slice(samples, w[0].1, w[1].0));
        }
        if sil_tags[sil_tags.len() - 1].1 < total_frames {
            chunks.push(self.apply_slice(samples, sil_tags[sil_tags.len() - 1].1, total_frames));
        }
        chunks
    }

    fn apply_slice(&self, samples: &[f32], begin_frame: usize, end_frame: usize) -> Vec<f32> {
        let begin = begin_frame * self.hop_size;
        let end = (end_frame * self.hop_size).min(samples.len());
        samples[begin..end].to_vec()
    }
}

/// Centered framed RMS: the signal is zero padded by `win/2` on both sides,
/// then windows of `win` samples are taken every `hop`.
fn framed_rms(samples: &[f32], win: usize, hop: usize) -> Vec<f32> {
    let pad = win / 2;
    let padded_len = samples.len() + 2 * pad;
    if padded_len < win || hop == 0 {
        return Vec::new();
    }
    let n_frames = (padded_len - win) / hop + 1;
    let mut out = Vec::with_capacity(n_frames);

    let sample_at = |i: isize| -> f32 {
        if i < 0 || i as usize >= samples.len() {
            0.0
        } else {
            samples[i as usize]
        }
    };

    for f in 0..n_frames {
        let start = f as isize * hop as isize - pad as isize;
        let mut acc = 0.0f64;
        for j in 0..win {
            let s = sample_at(start + j as isize) as f64;
            acc += s * s;
        }
        out.push((acc / win as f64).sqrt() as f32);
    }
    out
}

/// First index of the minimum, like numpy's argmin.
fn argmin(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v < values[best] {
            best = i;
        }
    }
    best
}
