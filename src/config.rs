use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PrepError;

/// Target sample rate for the full-rate training waveforms.
///
/// The set is closed: the downstream vocoder configs only exist for these
/// three rates, so anything else is a fatal misconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSampleRate {
    Hz32k,
    Hz40k,
    Hz48k,
}

impl TargetSampleRate {
    pub fn as_hz(self) -> u32 {
        match self {
            Self::Hz32k => 32_000,
            Self::Hz40k => 40_000,
            Self::Hz48k => 48_000,
        }
    }
}

impl FromStr for TargetSampleRate {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "32k" | "32000" => Ok(Self::Hz32k),
            "40k" | "40000" => Ok(Self::Hz40k),
            "48k" | "48000" => Ok(Self::Hz48k),
            other => Err(PrepError::invalid_config(format!(
                "sample rate `{other}` not understood (expected 32k, 40k or 48k)"
            ))),
        }
    }
}

/// Sample rate of the resampled copies consumed by pitch extraction and the
/// external feature extractor.
pub const FEATURE_SAMPLE_RATE_HZ: u32 = 16_000;

/// Directory contract rooted at one experiment directory.
///
/// Stage outputs are sibling directories with fixed names; the trainer and
/// the external feature extractor address them by these names.
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    pub exp_dir: PathBuf,
}

impl ExperimentLayout {
    pub fn new(exp_dir: impl Into<PathBuf>) -> Self {
        Self {
            exp_dir: exp_dir.into(),
        }
    }

    pub fn gt_wavs_dir(&self) -> PathBuf {
        self.exp_dir.join("0_gt_wavs")
    }

    pub fn wavs_16k_dir(&self) -> PathBuf {
        self.exp_dir.join("1_16k_wavs")
    }

    pub fn f0_coarse_dir(&self) -> PathBuf {
        self.exp_dir.join("2a_f0")
    }

    pub fn f0_continuous_dir(&self) -> PathBuf {
        self.exp_dir.join("2b-f0nsf")
    }

    pub fn feature_dir(&self) -> PathBuf {
        self.exp_dir.join("3_feature768")
    }

    pub fn speaker_mapping_path(&self) -> PathBuf {
        self.exp_dir.join("speaker_mapping.json")
    }

    pub fn preprocess_log_path(&self) -> PathBuf {
        self.exp_dir.join("preprocess.log")
    }

    pub fn f0_log_path(&self) -> PathBuf {
        self.exp_dir.join("extract_f0.log")
    }

    pub fn feature_log_path(&self) -> PathBuf {
        self.exp_dir.join("extract_feature.log")
    }

    pub(crate) fn create_preprocess_dirs(&self) -> Result<(), PrepError> {
        for dir in [&self.exp_dir, &self.gt_wavs_dir(), &self.wavs_16k_dir()] {
            std::fs::create_dir_all(dir)
                .map_err(|e| PrepError::io("create preprocess output dirs", e))?;
        }
        Ok(())
    }

    pub(crate) fn create_f0_dirs(&self) -> Result<(), PrepError> {
        for dir in [&self.f0_coarse_dir(), &self.f0_continuous_dir()] {
            std::fs::create_dir_all(dir).map_err(|e| PrepError::io("create f0 output dirs", e))?;
        }
        Ok(())
    }

    pub(crate) fn create_feature_dir(&self) -> Result<(), PrepError> {
        std::fs::create_dir_all(self.feature_dir())
            .map_err(|e| PrepError::io("create feature output dir", e))
    }
}

/// Silence-detection parameters for the segmenter, durations in ms.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SlicerParams {
    pub threshold_db: f32,
    pub min_length_ms: f32,
    pub min_interval_ms: f32,
    pub hop_size_ms: f32,
    pub max_sil_kept_ms: f32,
}

impl Default for SlicerParams {
    fn default() -> Self {
        Self {
            threshold_db: -42.0,
            min_length_ms: 1500.0,
            min_interval_ms: 400.0,
            hop_size_ms: 15.0,
            max_sil_kept_ms: 500.0,
        }
    }
}

/// Soft-normalization and rejection parameters for written chunks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NormalizeParams {
    /// Chunks whose raw peak exceeds this are dropped as clipped recordings.
    pub peak_ceiling: f32,
    pub target_peak: f32,
    pub alpha: f32,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            peak_ceiling: 2.5,
            target_peak: 0.9,
            alpha: 0.75,
        }
    }
}

/// Fixed-duration chunking of silence-bounded segments, in seconds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChunkParams {
    pub per_s: f32,
    pub overlap_s: f32,
}

impl ChunkParams {
    pub fn tail_s(&self) -> f32 {
        self.per_s + self.overlap_s
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            per_s: 3.0,
            overlap_s: 0.3,
        }
    }
}

/// Pipeline-wide pitch constants. All variants share these so that their
/// contours stay comparable.
#[derive(Debug, Clone)]
pub struct F0Config {
    pub sample_rate_hz: u32,
    /// Samples advanced per output frame (160 @ 16 kHz = 10 ms).
    pub hop_size: usize,
    pub f0_min_hz: f32,
    pub f0_max_hz: f32,
    pub f0_bins: usize,
    /// CREPE weights, loaded lazily on first crepe/mangio-crepe item.
    pub crepe_model_path: PathBuf,
}

impl F0Config {
    pub fn mel_min(&self) -> f32 {
        hz_to_mel(self.f0_min_hz)
    }

    pub fn mel_max(&self) -> f32 {
        hz_to_mel(self.f0_max_hz)
    }

    /// Exact contour length for a waveform at the pipeline's 16 kHz rate.
    pub fn frame_count(&self, num_samples: usize) -> usize {
        num_samples / self.hop_size
    }

    pub fn frame_period_ms(&self) -> f32 {
        1000.0 * self.hop_size as f32 / self.sample_rate_hz as f32
    }
}

impl Default for F0Config {
    fn default() -> Self {
        Self {
            sample_rate_hz: FEATURE_SAMPLE_RATE_HZ,
            hop_size: 160,
            f0_min_hz: 50.0,
            f0_max_hz: 1100.0,
            f0_bins: 256,
            crepe_model_path: PathBuf::from("assets/crepe_full.safetensors"),
        }
    }
}

pub(crate) fn hz_to_mel(hz: f32) -> f32 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

/// Collect sorted audio inputs (`.wav`/`.flac`) from a directory.
pub fn list_audio_inputs(dir: &Path) -> Result<Vec<PathBuf>, PrepError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PrepError::io("read input dir", e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PrepError::io("read input dir entry", e))?;
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("wav") | Some("flac")) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_sample_rate_parses_known_values() {
        assert_eq!(
            "48k".parse::<TargetSampleRate>().unwrap(),
            TargetSampleRate::Hz48k
        );
        assert_eq!(
            "32K".parse::<TargetSampleRate>().unwrap().as_hz(),
            32_000
        );
        assert_eq!(
            "40000".parse::<TargetSampleRate>().unwrap().as_hz(),
            40_000
        );
    }

    #[test]
    fn target_sample_rate_rejects_unknown_value() {
        let err = "44k".parse::<TargetSampleRate>().unwrap_err();
        assert!(matches!(err, PrepError::InvalidConfig { .. }));
        assert!(err.to_string().contains("44k"));
    }

    #[test]
    fn layout_paths_follow_directory_contract() {
        let layout = ExperimentLayout::new("/tmp/exp");
        assert!(layout.gt_wavs_dir().ends_with("0_gt_wavs"));
        assert!(layout.wavs_16k_dir().ends_with("1_16k_wavs"));
        assert!(layout.f0_coarse_dir().ends_with("2a_f0"));
        assert!(layout.f0_continuous_dir().ends_with("2b-f0nsf"));
        assert!(layout.feature_dir().ends_with("3_feature768"));
    }

    #[test]
    fn f0_frame_count_is_floor_of_hops() {
        let cfg = F0Config::default();
        assert_eq!(cfg.frame_count(48_000), 300);
        assert_eq!(cfg.frame_count(48_159), 300);
        assert_eq!(cfg.frame_count(159), 0);
        assert!((cfg.frame_period_ms() - 10.0).abs() < 1e-6);
    }
}
