//! Butterworth high-pass used ahead of silence slicing to strip DC and
//! sub-audible rumble that would bias the RMS envelope.
//!
//! Designed per run for the run's sample rate (bilinear transform of the
//! analog prototype) and applied one-directional as a cascade of
//! second-order sections, which keeps the design numerically stable at
//! low cutoff/rate ratios.

use std::f64::consts::PI;

use crate::error::PrepError;

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Debug, Clone)]
pub struct HighPass {
    sections: Vec<Biquad>,
}

impl HighPass {
    /// Butterworth high-pass of the given order.
    pub fn butterworth(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self, PrepError> {
        if order == 0 {
            return Err(PrepError::invalid_config("high-pass order must be >= 1"));
        }
        if !(0.0 < cutoff_hz && cutoff_hz < sample_rate_hz / 2.0) {
            return Err(PrepError::invalid_config(format!(
                "high-pass cutoff {cutoff_hz} Hz out of range for fs {sample_rate_hz} Hz"
            )));
        }

        // Prewarped analog cutoff and bilinear constant.
        let wc = 2.0 * sample_rate_hz * (PI * cutoff_hz / sample_rate_hz).tan();
        let k = 2.0 * sample_rate_hz;

        let mut sections = Vec::new();

        // Conjugate pole pairs of the analog prototype, mapped LP->HP (s -> wc/s)
        // then through the bilinear transform. Zeros land at z = 1.
        for i in 0..order / 2 {
            let theta = PI * (2.0 * i as f64 + order as f64 + 1.0) / (2.0 * order as f64);
            let (pre, pim) = (theta.cos(), theta.sin());
            // HP pole: wc / p for unit-circle prototype pole p.
            let denom = pre * pre + pim * pim;
            let (hre, him) = (wc * pre / denom, -wc * pim / denom);
            // z = (k + p) / (k - p)
            let (nre, nim) = (k + hre, him);
            let (dre, dim) = (k - hre, -him);
            let dmag = dre * dre + dim * dim;
            let zre = (nre * dre + nim * dim) / dmag;
            let zim = (nim * dre - nre * dim) / dmag;

            let a1 = -2.0 * zre;
            let a2 = zre * zre + zim * zim;
            // Unity gain at Nyquist (z = -1); numerator (1 - z^-1)^2 evaluates to 4.
            let g = (1.0 + a1 * -1.0 + a2) / 4.0;
            let g = g.abs();
            sections.push(Biquad {
                b0: g,
                b1: -2.0 * g,
                b2: g,
                a1,
                a2,
            });
        }

        if order % 2 == 1 {
            // Real prototype pole at s = -1 -> HP pole at s = -wc.
            let zp = (k - wc) / (k + wc);
            let g = (1.0 + zp) / 2.0;
            sections.push(Biquad {
                b0: g,
                b1: -g,
                b2: 0.0,
                a1: -zp,
                a2: 0.0,
            });
        }

        Ok(Self { sections })
    }

    /// Filter a buffer, returning a new one. State starts at zero.
    pub fn filter(&self, samples: &[f32]) -> Vec<f32> {
        let mut out: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        for sec in &self.sections {
            let mut s1 = 0.0f64;
            let mut s2 = 0.0f64;
            for v in out.iter_mut() {
                let x = *v;
                let y = sec.b0 * x + s1;
                s1 = sec.b1 * x - sec.a1 * y + s2;
                s2 = sec.b2 * x - sec.a2 * y;
                *v = y;
            }
        }
        out.into_iter().map(|v| v as f32).collect()
    }
}
