//! RMVPE-backed contour through a delegated session.
//!
//! The model itself is injected (see [`LazyPitchModel`]); this module only
//! owns the thin contour shaping around it. A run that selects rmvpe
//! without a configured backend fails on the first item with a
//! configuration error, not at startup.

use crate::config::F0Config;
use crate::error::PrepError;
use crate::f0::LazyPitchModel;

const PERIODICITY_THRESHOLD: f32 = 0.03;

pub fn compute_rmvpe(
    session: &LazyPitchModel,
    samples: &[f32],
    cfg: &F0Config,
) -> Result<Vec<f32>, PrepError> {
    let out = session.predict(samples, cfg.sample_rate_hz, cfg.hop_size, 1)?;
    let mut f0 = out.f0_hz;
    for (f, pd) in f0.iter_mut().zip(&out.periodicity) {
        if *pd < PERIODICITY_THRESHOLD {
            *f = 0.0;
        }
    }
    Ok(f0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::f0::{ModelPitch, PitchModel};

    struct FixedModel;

    impl PitchModel for FixedModel {
        fn predict(
            &self,
            samples: &[f32],
            _sample_rate_hz: u32,
            hop_size: usize,
            _batch_size: usize,
        ) -> Result<ModelPitch, PrepError> {
            let n = samples.len() / hop_size;
            let mut periodicity = vec![0.8; n];
            if n > 1 {
                periodicity[n - 1] = 0.01;
            }
            Ok(ModelPitch {
                f0_hz: vec![330.0; n],
                periodicity,
            })
        }
    }

    #[test]
    fn low_confidence_frames_are_zeroed() {
        let cfg = F0Config::default();
        let session = LazyPitchModel::new(Box::new(|| {
            Ok(Box::new(FixedModel) as Box<dyn PitchModel>)
        }));
        let f0 = compute_rmvpe(&session, &[0.1; 1600], &cfg).unwrap();
        assert_eq!(f0.len(), 10);
        assert_eq!(f0[9], 0.0);
        assert!(f0[..9].iter().all(|&f| (f - 330.0).abs() < 1e-6));
    }

    #[test]
    fn missing_backend_surfaces_as_config_error() {
        let cfg = F0Config::default();
        let session = LazyPitchModel::unconfigured("rmvpe");
        let err = compute_rmvpe(&session, &[0.1; 1600], &cfg).unwrap_err();
        assert!(matches!(err, PrepError::InvalidConfig { .. }));
    }
}
