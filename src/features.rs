//! Stage 3: frame-level speech representations for the trainer.
//!
//! The representation model itself (a 768-dim speech encoder) is an
//! external capability injected through [`FeatureExtractor`]; this stage
//! owns the scan/skip/persist choreography and the data-quality gate
//! around it.

use std::path::PathBuf;

use ndarray::Array2;
use ndarray_npy::write_npy;

use crate::audio;
use crate::batch::{BatchRunner, BatchSummary, ItemOutcome};
use crate::config::{ExperimentLayout, FEATURE_SAMPLE_RATE_HZ};
use crate::error::PrepError;
use crate::logsink::LogSink;

/// Frame-level encoder seam: 16 kHz mono in, `(frames, 768)` out.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, samples: &[f32]) -> Result<Array2<f32>, PrepError>;
}

#[derive(Debug, Clone)]
pub struct FeatureStageOptions {
    pub exp_dir: PathBuf,
    pub workers: usize,
}

#[derive(Debug, Clone)]
struct FeatureItem {
    input: PathBuf,
    output: PathBuf,
}

/// Stage driver: encode every 16 kHz chunk that has no feature file yet.
/// Feature matrices containing NaN are rejected without writing; the
/// distinct log line makes the bad input findable afterwards.
pub fn run_feature_stage(
    opts: &FeatureStageOptions,
    extractor: &dyn FeatureExtractor,
) -> Result<BatchSummary, PrepError> {
    let layout = ExperimentLayout::new(&opts.exp_dir);
    layout.create_feature_dir()?;
    let (sink, log) = LogSink::create(&layout.feature_log_path())?;

    let items = list_feature_items(&layout)?;
    log.log(format!("extract-feature: {} file(s)", items.len()));

    let summary = BatchRunner::new(opts.workers)
        .with_progress_divisor(10)
        .run("extract-feature", &items, &log, |item: &FeatureItem| {
            if item.output.exists() {
                return Ok(ItemOutcome::Skipped);
            }
            let samples = audio::load_audio(&item.input, FEATURE_SAMPLE_RATE_HZ)?;
            let features = extractor.extract(&samples)?;
            if features.iter().any(|v| v.is_nan()) {
                log.log(format!(
                    "`{}`: features contain NaN, file dropped",
                    item.input.display()
                ));
                return Ok(ItemOutcome::Rejected);
            }
            write_npy(&item.output, &features)
                .map_err(|e| PrepError::runtime("write feature matrix", e))?;
            Ok(ItemOutcome::Done)
        });

    drop(log);
    sink.finish();
    Ok(summary)
}

/// Feature outputs drop the `.wav` suffix: `0_5.wav` -> `0_5.npy`.
fn list_feature_items(layout: &ExperimentLayout) -> Result<Vec<FeatureItem>, PrepError> {
    let dir = layout.wavs_16k_dir();
    let entries = std::fs::read_dir(&dir).map_err(|e| PrepError::io("read 16k wav dir", e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PrepError::io("read 16k wav dir entry", e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".wav") && !name.contains("spec") {
            names.push(name);
        }
    }
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| {
            let stem = name.trim_end_matches(".wav");
            FeatureItem {
                input: dir.join(&name),
                output: layout.feature_dir().join(format!("{stem}.npy")),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::read_npy;

    struct ConstantEncoder {
        nan_for: Option<usize>,
    }

    impl FeatureExtractor for ConstantEncoder {
        fn extract(&self, samples: &[f32]) -> Result<Array2<f32>, PrepError> {
            let frames = (samples.len() / 320).max(1);
            let mut out = Array2::zeros((frames, 768));
            out.fill(0.5);
            if let Some(sample_count) = self.nan_for {
                if samples.len() == sample_count {
                    out[[0, 0]] = f32::NAN;
                }
            }
            Ok(out)
        }
    }

    fn seed_16k_wavs(exp: &ExperimentLayout, specs: &[(&str, usize)]) {
        std::fs::create_dir_all(exp.wavs_16k_dir()).unwrap();
        for (name, len) in specs {
            audio::write_wav(
                &exp.wavs_16k_dir().join(name),
                &vec![0.1f32; *len],
                FEATURE_SAMPLE_RATE_HZ,
            )
            .unwrap();
        }
    }

    #[test]
    fn features_are_written_once_and_skipped_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ExperimentLayout::new(dir.path());
        seed_16k_wavs(&layout, &[("0_0.wav", 3200), ("0_1.wav", 3200)]);

        let opts = FeatureStageOptions {
            exp_dir: dir.path().to_path_buf(),
            workers: 2,
        };
        let encoder = ConstantEncoder { nan_for: None };

        let first = run_feature_stage(&opts, &encoder).unwrap();
        assert_eq!(first.done, 2);

        let features: Array2<f32> =
            read_npy(layout.feature_dir().join("0_0.npy")).unwrap();
        assert_eq!(features.dim(), (10, 768));

        let second = run_feature_stage(&opts, &encoder).unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.done, 0);
    }

    #[test]
    fn nan_features_are_dropped_as_data_quality_not_failures() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ExperimentLayout::new(dir.path());
        seed_16k_wavs(&layout, &[("0_0.wav", 3200), ("0_1.wav", 6400)]);

        let opts = FeatureStageOptions {
            exp_dir: dir.path().to_path_buf(),
            workers: 1,
        };
        let encoder = ConstantEncoder {
            nan_for: Some(6400),
        };

        let summary = run_feature_stage(&opts, &encoder).unwrap();
        assert_eq!(summary.done, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.failed, 0, "a NaN drop is not a crash");
        assert!(layout.feature_dir().join("0_0.npy").exists());
        assert!(!layout.feature_dir().join("0_1.npy").exists());

        let log = std::fs::read_to_string(layout.feature_log_path()).unwrap();
        assert!(log.contains("NaN"));
        assert!(log.contains("dropped"));
        assert!(!log.contains("failed ("), "no generic failure line for the drop");
    }

    #[test]
    fn reserved_names_are_excluded_from_the_listing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ExperimentLayout::new(dir.path());
        seed_16k_wavs(&layout, &[("0_0.wav", 3200), ("mute_spec.wav", 3200)]);

        let items = list_feature_items(&layout).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].input.ends_with("0_0.wav"));
    }
}
