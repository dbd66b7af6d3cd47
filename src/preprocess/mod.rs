//! Stage 1: raw recordings -> normalized training chunks at two rates.
//!
//! Per file: decode + resample to the run's rate, high-pass, slice at
//! silences, split every segment into fixed-duration overlapping chunks,
//! soft-normalize and write each chunk to `0_gt_wavs/` (full rate) and
//! `1_16k_wavs/` (16 kHz).

pub mod speaker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio;
use crate::audio::highpass::HighPass;
use crate::batch::{BatchRunner, BatchSummary, ItemOutcome};
use crate::config::{
    list_audio_inputs, ChunkParams, ExperimentLayout, NormalizeParams, SlicerParams,
    TargetSampleRate, FEATURE_SAMPLE_RATE_HZ,
};
use crate::error::PrepError;
use crate::logsink::{LogHandle, LogSink};
use crate::segment::Slicer;
use crate::types::ChunkTag;
use speaker::{parse_speaker_token, SpeakerMap};

const HIGHPASS_ORDER: usize = 5;
const HIGHPASS_CUTOFF_HZ: f64 = 48.0;

pub struct PreProcessor {
    sample_rate_hz: u32,
    slicer: Slicer,
    highpass: HighPass,
    chunk: ChunkParams,
    norm: NormalizeParams,
    layout: ExperimentLayout,
}

impl PreProcessor {
    pub fn new(
        sample_rate: TargetSampleRate,
        layout: ExperimentLayout,
        slicer_params: &SlicerParams,
        chunk: ChunkParams,
        norm: NormalizeParams,
    ) -> Result<Self, PrepError> {
        let sample_rate_hz = sample_rate.as_hz();
        Ok(Self {
            sample_rate_hz,
            slicer: Slicer::new(sample_rate_hz, slicer_params)?,
            highpass: HighPass::butterworth(
                HIGHPASS_ORDER,
                HIGHPASS_CUTOFF_HZ,
                sample_rate_hz as f64,
            )?,
            chunk,
            norm,
            layout,
        })
    }

    /// Run one input file through the whole stage. Returns the number of
    /// chunks written.
    pub fn process_file(
        &self,
        path: &Path,
        idx0: usize,
        speakers: &SpeakerMap,
        log: &LogHandle,
    ) -> Result<usize, PrepError> {
        let raw = audio::load_audio(path, self.sample_rate_hz)?;
        let filtered = self.highpass.filter(&raw);

        let speaker_id = parse_speaker_token(path).and_then(|token| speakers.get(&token));

        let mut idx1 = 0usize;
        let mut written = 0usize;
        for segment in self.slicer.slice(&filtered) {
            for (start, end) in chunk_ranges(segment.len(), self.sample_rate_hz, &self.chunk) {
                let tag = ChunkTag {
                    idx0,
                    idx1,
                    speaker_id,
                };
                idx1 += 1;
                if self.norm_write(&segment[start..end], &tag, log)? {
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    /// Soft-normalize one chunk and write both rates. Data-quality drops
    /// (clipped or silent chunks) return `Ok(false)` after a log line; they
    /// are not errors.
    fn norm_write(&self, samples: &[f32], tag: &ChunkTag, log: &LogHandle) -> Result<bool, PrepError> {
        let peak = audio::peak(samples);
        if peak > self.norm.peak_ceiling {
            log.log(format!(
                "{}-{}: peak {peak:.3} over ceiling {}, chunk dropped",
                tag.idx0, tag.idx1, self.norm.peak_ceiling
            ));
            return Ok(false);
        }
        if peak <= f32::EPSILON {
            log.log(format!(
                "{}-{}: silent chunk dropped",
                tag.idx0, tag.idx1
            ));
            return Ok(false);
        }

        let gain = self.norm.target_peak * self.norm.alpha / peak;
        let residual = 1.0 - self.norm.alpha;
        let normalized: Vec<f32> = samples.iter().map(|&s| s * gain + residual * s).collect();

        let name = tag.wav_name();
        audio::write_wav(
            &self.layout.gt_wavs_dir().join(&name),
            &normalized,
            self.sample_rate_hz,
        )?;
        let resampled =
            audio::resample::resample(&normalized, self.sample_rate_hz, FEATURE_SAMPLE_RATE_HZ)?;
        audio::write_wav(
            &self.layout.wavs_16k_dir().join(&name),
            &resampled,
            FEATURE_SAMPLE_RATE_HZ,
        )?;
        Ok(true)
    }
}

/// Fixed-duration chunk ranges over a segment: the window slides forward by
/// `per - overlap` seconds; every non-tail chunk is exactly `per` seconds and
/// the remainder (at most `per + overlap`) is emitted once as the tail.
pub(crate) fn chunk_ranges(
    len: usize,
    sample_rate_hz: u32,
    params: &ChunkParams,
) -> Vec<(usize, usize)> {
    let sr = sample_rate_hz as f64;
    let step = sr * (params.per_s - params.overlap_s) as f64;
    let per = (sr * params.per_s as f64) as usize;
    let tail = sr * params.tail_s() as f64;

    let mut ranges = Vec::new();
    let mut i = 0u64;
    loop {
        let start = (step * i as f64) as usize;
        if (len.saturating_sub(start)) as f64 > tail {
            ranges.push((start, start + per));
            i += 1;
        } else {
            ranges.push((start, len));
            return ranges;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub input_dir: PathBuf,
    pub exp_dir: PathBuf,
    pub workers: usize,
    pub sample_rate: TargetSampleRate,
    pub slicer: SlicerParams,
    pub chunk: ChunkParams,
    pub norm: NormalizeParams,
}

/// Stage driver: list inputs, resolve speakers single-threaded, then fan out.
pub fn run_preprocess_stage(opts: &PreprocessOptions) -> Result<BatchSummary, PrepError> {
    let layout = ExperimentLayout::new(&opts.exp_dir);
    layout.create_preprocess_dirs()?;
    let (sink, log) = LogSink::create(&layout.preprocess_log_path())?;

    let inputs = list_audio_inputs(&opts.input_dir)?;
    let items: Vec<(usize, PathBuf)> = inputs.iter().cloned().enumerate().collect();

    // Speaker ids are assigned before fan-out so every worker shares one
    // immutable, globally consistent numbering.
    let speakers = Arc::new(SpeakerMap::from_paths(inputs.iter().map(|p| p.as_path())));
    if !speakers.is_empty() {
        speakers.save(&layout.speaker_mapping_path())?;
        log.log(format!("{} speaker(s) mapped", speakers.len()));
    }

    let processor = PreProcessor::new(
        opts.sample_rate,
        layout,
        &opts.slicer,
        opts.chunk.clone(),
        opts.norm.clone(),
    )?;

    log.log("preprocess: start");
    let summary = BatchRunner::new(opts.workers).run(
        "preprocess",
        &items,
        &log,
        |(idx0, path): &(usize, PathBuf)| {
            let written = processor.process_file(path, *idx0, &speakers, &log)?;
            log.log(format!("`{}` -> ok, {written} chunk(s)", path.display()));
            Ok(ItemOutcome::Done)
        },
    );
    log.log("preprocess: end");

    drop(log);
    sink.finish();
    Ok(summary)
}
