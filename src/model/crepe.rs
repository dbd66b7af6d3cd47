//! CREPE (full capacity) pitch classifier.
//!
//! Six strided Conv2d+BatchNorm+maxpool blocks over 1024-sample windows,
//! a linear head over 360 pitch bins spaced 20 cents apart, sigmoid
//! salience out. Decoding takes a weighted average of the salience in a
//! +-4 bin neighbourhood of the argmax, which resolves pitch below the
//! 20-cent bin width; the argmax salience doubles as the voicing
//! confidence.

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear, ModuleT, VarBuilder};

use crate::error::PrepError;
use crate::f0::{ModelPitch, PitchModel};

pub const WINDOW_SIZE: usize = 1024;
const PITCH_BINS: usize = 360;
const CENTS_PER_BIN: f32 = 20.0;
/// Cents of bin 0 relative to 10 Hz (so f0 = 10 * 2^(cents/1200)).
const CENTS_OFFSET: f32 = 1997.379_4;
const DECODE_RADIUS: usize = 4;

const IN_CHANNELS: [usize; 6] = [1, 1024, 128, 128, 128, 256];
const OUT_CHANNELS: [usize; 6] = [1024, 128, 128, 128, 256, 512];

#[derive(Debug)]
struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
    pad_front: usize,
    pad_back: usize,
}

impl ConvBlock {
    fn load(layer: usize, vb: &VarBuilder) -> candle_core::Result<Self> {
        let (kernel_h, stride, pad_front, pad_back) = if layer == 0 {
            (512, 4, 254, 254)
        } else {
            (64, 1, 31, 32)
        };
        let in_c = IN_CHANNELS[layer];
        let out_c = OUT_CHANNELS[layer];

        let name = format!("conv{}", layer + 1);
        let weight = vb.get((out_c, in_c, kernel_h, 1), &format!("{name}.weight"))?;
        let bias = vb.get(out_c, &format!("{name}.bias"))?;
        let conv = Conv2d::new(
            weight,
            Some(bias),
            Conv2dConfig {
                stride,
                ..Default::default()
            },
        );
        let bn = candle_nn::batch_norm(out_c, 1e-5, vb.pp(format!("{name}_BN")))?;
        Ok(Self {
            conv,
            bn,
            pad_front,
            pad_back,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        // Asymmetric "same" padding along the sample axis (dim 2).
        let xs = xs.pad_with_zeros(2, self.pad_front, self.pad_back)?;
        let xs = self.conv.forward(&xs)?.relu()?;
        let xs = self.bn.forward_t(&xs, false)?;
        xs.max_pool2d((2, 1))
    }
}

#[derive(Debug)]
pub struct CrepeModel {
    blocks: Vec<ConvBlock>,
    classifier: Linear,
    device: Device,
}

impl CrepeModel {
    /// Load the full-capacity weights from a safetensors file. A missing
    /// file is a configuration error so that a batch run fails on its first
    /// crepe item with an actionable message.
    pub fn load(path: &Path) -> Result<Self, PrepError> {
        if !path.exists() {
            return Err(PrepError::invalid_config(format!(
                "crepe weights not found at `{}`",
                path.display()
            )));
        }
        let data = std::fs::read(path).map_err(|e| PrepError::io("read crepe weights", e))?;
        let device = Device::Cpu;
        let vb = VarBuilder::from_buffered_safetensors(data, DType::F32, &device)
            .map_err(|e| PrepError::runtime("load crepe safetensors", e))?;
        Self::from_var_builder(vb, device)
            .map_err(|e| PrepError::runtime("build crepe model", e))
    }

    fn from_var_builder(vb: VarBuilder, device: Device) -> candle_core::Result<Self> {
        let blocks = (0..6)
            .map(|i| ConvBlock::load(i, &vb))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let classifier = candle_nn::linear(2048, PITCH_BINS, vb.pp("classifier"))?;
        Ok(Self {
            blocks,
            classifier,
            device,
        })
    }

    /// Salience for a batch of normalized 1024-sample frames,
    /// shape (frames, 360).
    fn salience(&self, frames: &[Vec<f32>]) -> candle_core::Result<Vec<Vec<f32>>> {
        let batch = frames.len();
        let flat: Vec<f32> = frames.iter().flatten().copied().collect();
        let xs = Tensor::from_vec(flat, (batch, 1, WINDOW_SIZE, 1), &self.device)?;

        let mut h = xs;
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        // (batch, 512, 4, 1) -> (batch, 2048)
        let h = h.permute((0, 2, 1, 3))?.contiguous()?.reshape((batch, 2048))?;
        let logits = self.classifier.forward(&h)?;
        candle_nn::ops::sigmoid(&logits)?.to_vec2::<f32>()
    }
}

impl PitchModel for CrepeModel {
    fn predict(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
        hop_size: usize,
        batch_size: usize,
    ) -> Result<ModelPitch, PrepError> {
        if sample_rate_hz != 16_000 {
            return Err(PrepError::runtime(
                "crepe inference",
                format!("expected 16 kHz input, got {sample_rate_hz} Hz"),
            ));
        }
        let frames = window_frames(samples, hop_size.max(1));

        let mut f0_hz = Vec::with_capacity(frames.len());
        let mut periodicity = Vec::with_capacity(frames.len());
        for chunk in frames.chunks(batch_size.max(1)) {
            let salience = self
                .salience(chunk)
                .map_err(|e| PrepError::runtime("crepe inference", e))?;
            for row in &salience {
                let (hz, confidence) = decode_salience(row);
                f0_hz.push(hz);
                periodicity.push(confidence);
            }
        }
        Ok(ModelPitch { f0_hz, periodicity })
    }
}

/// Centered 1024-sample windows every `hop` samples, each normalized to
/// zero mean and unit deviation.
fn window_frames(samples: &[f32], hop: usize) -> Vec<Vec<f32>> {
    let half = WINDOW_SIZE / 2;
    let mut padded = vec![0.0f32; half];
    padded.extend_from_slice(samples);
    padded.resize(samples.len() + WINDOW_SIZE, 0.0);

    let n_frames = 1 + samples.len() / hop;
    (0..n_frames)
        .map(|i| {
            let start = i * hop;
            let mut frame = padded[start..start + WINDOW_SIZE].to_vec();
            let mean = frame.iter().sum::<f32>() / WINDOW_SIZE as f32;
            let var =
                frame.iter().map(|&s| (s - mean) * (s - mean)).sum::<f32>() / WINDOW_SIZE as f32;
            let std = var.sqrt().max(1e-10);
            for s in &mut frame {
                *s = (*s - mean) / std;
            }
            frame
        })
        .collect()
}

/// Weighted-average decode around the salience peak.
pub(crate) fn decode_salience(salience: &[f32]) -> (f32, f32) {
    let (peak_bin, &peak) = salience
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((0, &0.0));

    let lo = peak_bin.saturating_sub(DECODE_RADIUS);
    let hi = (peak_bin + DECODE_RADIUS + 1).min(salience.len());
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for bin in lo..hi {
        let cents = CENTS_PER_BIN * bin as f32 + CENTS_OFFSET;
        weighted += salience[bin] * cents;
        total += salience[bin];
    }
    if total <= f32::MIN_POSITIVE {
        return (0.0, peak);
    }
    let cents = weighted / total;
    (10.0 * (cents / 1200.0).exp2(), peak)
}

/// Frequency of a pitch bin, used by tests to build synthetic salience.
#[cfg(test)]
pub(crate) fn bin_to_hz(bin: usize) -> f32 {
    10.0 * ((CENTS_PER_BIN * bin as f32 + CENTS_OFFSET) / 1200.0).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_weights_file_is_a_config_error() {
        let err = CrepeModel::load(&PathBuf::from("/nonexistent/crepe.safetensors")).unwrap_err();
        assert!(matches!(err, PrepError::InvalidConfig { .. }));
        assert!(err.to_string().contains("crepe"));
    }

    #[test]
    fn frame_grid_is_centered_and_normalized() {
        let samples = vec![0.5f32; 1600];
        let frames = window_frames(&samples, 160);
        assert_eq!(frames.len(), 11);
        for frame in &frames {
            assert_eq!(frame.len(), WINDOW_SIZE);
            let mean = frame.iter().sum::<f32>() / WINDOW_SIZE as f32;
            assert!(mean.abs() < 1e-3, "frame mean {mean}");
        }
    }

    #[test]
    fn sharp_salience_peak_decodes_to_its_bin_frequency() {
        let mut salience = vec![0.0f32; PITCH_BINS];
        salience[120] = 1.0;
        let (hz, confidence) = decode_salience(&salience);
        assert!((hz - bin_to_hz(120)).abs() / bin_to_hz(120) < 1e-3);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn symmetric_salience_decodes_between_bins() {
        let mut salience = vec![0.0f32; PITCH_BINS];
        salience[120] = 0.8;
        salience[121] = 0.8;
        let (hz, _) = decode_salience(&salience);
        let lo = bin_to_hz(120);
        let hi = bin_to_hz(121);
        assert!(hz > lo && hz < hi, "{hz} not within ({lo}, {hi})");
    }

    #[test]
    fn flat_salience_is_unvoiced() {
        let (hz, confidence) = decode_salience(&vec![0.0f32; PITCH_BINS]);
        assert_eq!(hz, 0.0);
        assert_eq!(confidence, 0.0);
    }
}
