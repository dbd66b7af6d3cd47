//! End-to-end run over a synthetic recording: preprocess into chunks, then
//! pitch-extract every chunk, then re-run both stages to confirm the pitch
//! stage resumes instead of recomputing.

use std::path::PathBuf;

use ndarray::{Array1, Array2};
use ndarray_npy::read_npy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vc_prep::f0::run_f0_stage;
use vc_prep::features::run_feature_stage;
use vc_prep::preprocess::run_preprocess_stage;
use vc_prep::{
    ChunkParams, ExperimentLayout, F0Config, F0Method, F0StageOptions, FeatureExtractor,
    FeatureStageOptions, NormalizeParams, PitchExtractorBuilder, PrepError, PreprocessOptions,
    SlicerParams, TargetSampleRate,
};

const SR: u32 = 48_000;
const TONE_HZ: f32 = 220.0;

/// 10 s at 48 kHz: tone, one second of near-silence from 4 s to 5 s, tone.
fn synthetic_recording() -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..(SR as usize * 10))
        .map(|i| {
            let t = i as f32 / SR as f32;
            if (4.0..5.0).contains(&t) {
                rng.gen_range(-1e-4..1e-4)
            } else {
                0.8 * (2.0 * std::f32::consts::PI * TONE_HZ * t).sin()
            }
        })
        .collect()
}

fn run_preprocess(input_dir: &PathBuf, exp_dir: &PathBuf) -> vc_prep::BatchSummary {
    let opts = PreprocessOptions {
        input_dir: input_dir.clone(),
        exp_dir: exp_dir.clone(),
        workers: 2,
        sample_rate: TargetSampleRate::Hz48k,
        slicer: SlicerParams::default(),
        chunk: ChunkParams::default(),
        norm: NormalizeParams::default(),
    };
    run_preprocess_stage(&opts).unwrap()
}

struct ConstantEncoder;

impl FeatureExtractor for ConstantEncoder {
    fn extract(&self, samples: &[f32]) -> Result<Array2<f32>, PrepError> {
        Ok(Array2::from_elem(((samples.len() / 320).max(1), 768), 0.25))
    }
}

#[test]
fn full_pipeline_on_a_synthetic_recording() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("raw");
    let exp_dir = dir.path().join("exp");
    std::fs::create_dir_all(&input_dir).unwrap();

    // Filename carries speaker token 7.
    vc_prep::audio::write_wav(
        &input_dir.join("song_7_take1.wav"),
        &synthetic_recording(),
        SR,
    )
    .unwrap();

    // Stage 1: expect the silence to split the recording and every segment
    // to be chunked, so several output pairs appear.
    let summary = run_preprocess(&input_dir, &exp_dir);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 0);

    let layout = ExperimentLayout::new(&exp_dir);
    let mut gt_names: Vec<String> = std::fs::read_dir(layout.gt_wavs_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    gt_names.sort();
    assert!(gt_names.len() >= 3, "expected several chunks, got {gt_names:?}");

    for name in &gt_names {
        // file-index 0, per-file counter, mapped speaker id 0
        assert!(name.starts_with("0_"), "unexpected chunk name {name}");
        assert!(name.ends_with("_0.wav"), "missing speaker suffix in {name}");
        assert!(layout.wavs_16k_dir().join(name).exists());
    }

    let mapping: std::collections::HashMap<String, u32> = serde_json::from_str(
        &std::fs::read_to_string(layout.speaker_mapping_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(mapping.get("7"), Some(&0));
    assert!(layout.preprocess_log_path().exists());

    // Stage 2: pm contours for every chunk, both artifacts per input.
    let cfg = F0Config::default();
    let extractor = PitchExtractorBuilder::new(cfg.clone()).build();
    let f0_opts = F0StageOptions {
        exp_dir: exp_dir.clone(),
        workers: 2,
        method: F0Method::Pm,
        batch_or_hop: 512,
    };
    let f0_summary = run_f0_stage(&f0_opts, &extractor).unwrap();
    assert_eq!(f0_summary.done, gt_names.len());
    assert_eq!(f0_summary.failed, 0);

    for name in &gt_names {
        let continuous: Array1<f32> =
            read_npy(layout.f0_continuous_dir().join(format!("{name}.npy"))).unwrap();
        let coarse: Array1<i64> =
            read_npy(layout.f0_coarse_dir().join(format!("{name}.npy"))).unwrap();

        let chunk = vc_prep::audio::decode_audio(&layout.wavs_16k_dir().join(name)).unwrap();
        let expected_frames = chunk.samples.len() / cfg.hop_size;
        assert_eq!(continuous.len(), expected_frames);
        assert_eq!(coarse.len(), expected_frames);
        assert!(coarse.iter().all(|&b| (1..=255).contains(&b)));

        let mut voiced: Vec<f32> = continuous.iter().copied().filter(|&f| f > 0.0).collect();
        assert!(!voiced.is_empty(), "no voiced frames in {name}");
        voiced.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = voiced[voiced.len() / 2];
        assert!(
            (median - TONE_HZ).abs() < 5.0,
            "median f0 {median} off the {TONE_HZ} Hz tone in {name}"
        );
    }

    // Re-running stage 2 resumes: everything is already done.
    let resumed = run_f0_stage(&f0_opts, &extractor).unwrap();
    assert_eq!(resumed.done, 0);
    assert_eq!(resumed.skipped, gt_names.len());

    // Stage 3 with an injected encoder writes one matrix per chunk.
    let feat_opts = FeatureStageOptions {
        exp_dir: exp_dir.clone(),
        workers: 2,
    };
    let feat_summary = run_feature_stage(&feat_opts, &ConstantEncoder).unwrap();
    assert_eq!(feat_summary.done, gt_names.len());
    for name in &gt_names {
        let stem = name.trim_end_matches(".wav");
        assert!(layout.feature_dir().join(format!("{stem}.npy")).exists());
    }
}
