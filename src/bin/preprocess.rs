use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use vc_prep::preprocess::run_preprocess_stage;
use vc_prep::{ChunkParams, NormalizeParams, PreprocessOptions, SlicerParams, TargetSampleRate};

#[derive(Debug, Parser)]
#[command(name = "preprocess")]
#[command(about = "Slice, normalize and resample raw recordings into training chunks")]
struct Args {
    /// Directory of raw .wav/.flac recordings.
    input_dir: PathBuf,
    /// Experiment directory; stage outputs become subdirectories of it.
    exp_dir: PathBuf,
    #[arg(short = 'n', long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value = "48k")]
    sample_rate: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let sample_rate: TargetSampleRate = match args.sample_rate.parse() {
        Ok(rate) => rate,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let opts = PreprocessOptions {
        input_dir: args.input_dir,
        exp_dir: args.exp_dir,
        workers: args.workers,
        sample_rate,
        slicer: SlicerParams::default(),
        chunk: ChunkParams::default(),
        norm: NormalizeParams::default(),
    };

    match run_preprocess_stage(&opts) {
        Ok(summary) => {
            println!(
                "preprocess finished: done {} skipped {} rejected {} failed {}",
                summary.done, summary.skipped, summary.rejected, summary.failed
            );
            if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
