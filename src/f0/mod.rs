//! Stage 2: per-frame fundamental-frequency contours.
//!
//! Every backend produces a contour aligned to the pipeline frame grid
//! (16 kHz, hop 160 = 10 ms, 50-1100 Hz) so contours from different
//! algorithms stay comparable. Continuous contours land in `2b-f0nsf/`,
//! the quantized 256-bin form in `2a_f0/`.

pub mod ac;
pub mod coarse;
pub mod crepe;
pub mod rmvpe;
pub mod world;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use ndarray::Array1;
use ndarray_npy::write_npy;

use crate::audio;
use crate::batch::{BatchRunner, BatchSummary, ItemOutcome};
use crate::config::{ExperimentLayout, F0Config};
use crate::error::PrepError;
use crate::logsink::LogSink;
use crate::model::crepe::CrepeModel;
use crate::types::PathTriple;

/// Closed set of pitch backends. Dispatch is exhaustive; an unknown name
/// never survives past parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F0Method {
    /// Cross-correlation with a 10 ms step and symmetric padding.
    Pm,
    /// Time-domain estimator, dense candidate search plus refinement.
    Harvest,
    /// Time-domain estimator, coarse decimated search plus refinement.
    Dio,
    /// Neural, whole-waveform inference batched by `batch_size`.
    Crepe,
    /// Neural, percentile-normalized input with a tunable inference hop.
    MangioCrepe,
    /// Neural, delegated high-resolution model behind a lazy session.
    Rmvpe,
}

impl FromStr for F0Method {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pm" => Ok(Self::Pm),
            "harvest" => Ok(Self::Harvest),
            "dio" => Ok(Self::Dio),
            "crepe" => Ok(Self::Crepe),
            "mangio" | "mangio-crepe" => Ok(Self::MangioCrepe),
            "rmvpe" => Ok(Self::Rmvpe),
            other => Err(PrepError::invalid_config(format!(
                "f0 method `{other}` not understood \
                 (expected pm, harvest, dio, crepe, mangio-crepe or rmvpe)"
            ))),
        }
    }
}

impl F0Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pm => "pm",
            Self::Harvest => "harvest",
            Self::Dio => "dio",
            Self::Crepe => "crepe",
            Self::MangioCrepe => "mangio-crepe",
            Self::Rmvpe => "rmvpe",
        }
    }
}

/// Per-frame output of a neural pitch model.
#[derive(Debug, Clone)]
pub struct ModelPitch {
    pub f0_hz: Vec<f32>,
    /// Voicing confidence in [0, 1], same length as `f0_hz`.
    pub periodicity: Vec<f32>,
}

/// Inference seam for the neural backends. Implementations are not assumed
/// re-entrant; callers serialize access (see [`LazyPitchModel`]).
pub trait PitchModel: Send {
    fn predict(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
        hop_size: usize,
        batch_size: usize,
    ) -> Result<ModelPitch, PrepError>;
}

type ModelLoader = Box<dyn Fn() -> Result<Box<dyn PitchModel>, PrepError> + Send + Sync>;

/// Guarded optional model handle: loaded once on first use, reused for the
/// extractor's lifetime. The mutex also serializes inference, since the
/// model stacks are not assumed thread-safe.
pub struct LazyPitchModel {
    loader: ModelLoader,
    cell: Mutex<Option<Box<dyn PitchModel>>>,
}

impl LazyPitchModel {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            loader,
            cell: Mutex::new(None),
        }
    }

    /// A session whose first use fails with a configuration error.
    pub fn unconfigured(what: &'static str) -> Self {
        Self::new(Box::new(move || {
            Err(PrepError::invalid_config(format!(
                "no {what} backend configured for this run"
            )))
        }))
    }

    pub fn predict(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
        hop_size: usize,
        batch_size: usize,
    ) -> Result<ModelPitch, PrepError> {
        let mut guard = self
            .cell
            .lock()
            .map_err(|_| PrepError::runtime("pitch model session", "poisoned lock"))?;
        if guard.is_none() {
            *guard = Some((self.loader)()?);
        }
        match guard.as_ref() {
            Some(model) => model.predict(samples, sample_rate_hz, hop_size, batch_size),
            None => unreachable!("model initialized above"),
        }
    }
}

pub struct PitchExtractor {
    cfg: F0Config,
    crepe: LazyPitchModel,
    rmvpe: LazyPitchModel,
}

pub struct PitchExtractorBuilder {
    cfg: F0Config,
    crepe: Option<LazyPitchModel>,
    rmvpe: Option<LazyPitchModel>,
}

impl PitchExtractorBuilder {
    pub fn new(cfg: F0Config) -> Self {
        Self {
            cfg,
            crepe: None,
            rmvpe: None,
        }
    }

    pub fn with_crepe_session(mut self, session: LazyPitchModel) -> Self {
        self.crepe = Some(session);
        self
    }

    pub fn with_rmvpe_session(mut self, session: LazyPitchModel) -> Self {
        self.rmvpe = Some(session);
        self
    }

    pub fn build(self) -> PitchExtractor {
        let crepe = self.crepe.unwrap_or_else(|| {
            let path = self.cfg.crepe_model_path.clone();
            LazyPitchModel::new(Box::new(move || {
                Ok(Box::new(CrepeModel::load(&path)?) as Box<dyn PitchModel>)
            }))
        });
        let rmvpe = self
            .rmvpe
            .unwrap_or_else(|| LazyPitchModel::unconfigured("rmvpe"));
        PitchExtractor {
            cfg: self.cfg,
            crepe,
            rmvpe,
        }
    }
}

impl PitchExtractor {
    pub fn new(cfg: F0Config) -> Self {
        PitchExtractorBuilder::new(cfg).build()
    }

    pub fn config(&self) -> &F0Config {
        &self.cfg
    }

    /// Contour for a 16 kHz mono waveform, exactly
    /// `samples.len() / hop` frames long. `batch_or_hop` is the crepe batch
    /// size or the mangio-crepe inference hop; other methods ignore it.
    pub fn compute(
        &self,
        samples: &[f32],
        method: F0Method,
        batch_or_hop: usize,
    ) -> Result<Vec<f32>, PrepError> {
        let target_len = self.cfg.frame_count(samples.len());
        let contour = match method {
            F0Method::Pm => ac::pitch_cross_correlation(samples, &self.cfg),
            F0Method::Harvest => world::harvest(samples, &self.cfg),
            F0Method::Dio => world::dio(samples, &self.cfg),
            F0Method::Crepe => crepe::compute_crepe(&self.crepe, samples, &self.cfg, batch_or_hop)?,
            F0Method::MangioCrepe => {
                crepe::compute_mangio(&self.crepe, samples, &self.cfg, batch_or_hop)?
            }
            F0Method::Rmvpe => rmvpe::compute_rmvpe(&self.rmvpe, samples, &self.cfg)?,
        };
        Ok(pad_to_target(contour, target_len))
    }
}

/// Align a contour to the target frame count: symmetric zero padding with
/// the extra frame on the trailing side, trailing truncation when too long.
pub(crate) fn pad_to_target(mut contour: Vec<f32>, target_len: usize) -> Vec<f32> {
    if contour.len() >= target_len {
        contour.truncate(target_len);
        return contour;
    }
    let missing = target_len - contour.len();
    let front = missing / 2;
    let mut out = vec![0.0f32; front];
    out.extend_from_slice(&contour);
    out.resize(target_len, 0.0);
    out
}

#[derive(Debug, Clone)]
pub struct F0StageOptions {
    pub exp_dir: PathBuf,
    pub workers: usize,
    pub method: F0Method,
    /// Crepe batch size or mangio-crepe hop length; CLI default 512.
    pub batch_or_hop: usize,
}

/// Stage driver: scan `1_16k_wavs/`, skip finished path triples, persist
/// both contour forms per input.
pub fn run_f0_stage(
    opts: &F0StageOptions,
    extractor: &PitchExtractor,
) -> Result<BatchSummary, PrepError> {
    let layout = ExperimentLayout::new(&opts.exp_dir);
    layout.create_f0_dirs()?;
    let (sink, log) = LogSink::create(&layout.f0_log_path())?;

    let items = list_f0_items(&layout)?;
    log.log(format!(
        "extract-f0: method {} over {} file(s)",
        opts.method.as_str(),
        items.len()
    ));

    let summary = BatchRunner::new(opts.workers).run(
        "extract-f0",
        &items,
        &log,
        |triple: &PathTriple| {
            if triple.is_done() {
                return Ok(ItemOutcome::Skipped);
            }
            let samples = audio::load_audio(&triple.input, extractor.config().sample_rate_hz)?;
            let contour = extractor.compute(&samples, opts.method, opts.batch_or_hop)?;
            write_npy(&triple.continuous_out, &Array1::from_vec(contour.clone()))
                .map_err(|e| PrepError::runtime("write continuous f0", e))?;
            let quantized = coarse::coarse_f0(&contour, extractor.config());
            write_npy(&triple.coarse_out, &Array1::from_vec(quantized))
                .map_err(|e| PrepError::runtime("write coarse f0", e))?;
            Ok(ItemOutcome::Done)
        },
    );

    drop(log);
    sink.finish();
    Ok(summary)
}

/// Path triples for the pitch stage. Output names append `.npy` to the full
/// wav filename, which is what the downstream trainer expects; names
/// containing `spec` are reserved and excluded.
fn list_f0_items(layout: &ExperimentLayout) -> Result<Vec<PathTriple>, PrepError> {
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
        .map(|name| PathTriple {
            input: dir.join(&name),
            coarse_out: layout.f0_coarse_dir().join(format!("{name}.npy")),
            continuous_out: layout.f0_continuous_dir().join(format!("{name}.npy")),
        })
        .collect())
}
