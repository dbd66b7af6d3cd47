use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use vc_prep::f0::run_f0_stage;
use vc_prep::{F0Config, F0Method, F0StageOptions, PitchExtractorBuilder};

#[derive(Debug, Parser)]
#[command(name = "extract-f0")]
#[command(about = "Extract per-frame pitch contours for every preprocessed chunk")]
struct Args {
    /// Experiment directory produced by the preprocess stage.
    exp_dir: PathBuf,
    #[arg(short = 'n', long, default_value_t = default_workers())]
    workers: usize,
    #[arg(long, default_value = "pm")]
    method: String,
    /// Crepe batch size, or the inference hop length for mangio-crepe.
    #[arg(long, default_value_t = 512)]
    batch_or_hop: usize,
    /// CREPE weights (safetensors), loaded lazily on the first crepe item.
    #[arg(long)]
    crepe_model: Option<PathBuf>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let method: F0Method = match args.method.parse() {
        Ok(method) => method,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut cfg = F0Config::default();
    if let Some(path) = args.crepe_model {
        cfg.crepe_model_path = path;
    }
    // Model-file problems are configuration errors; surface them before any
    // worker starts rather than on the first crepe item.
    if matches!(method, F0Method::Crepe | F0Method::MangioCrepe)
        && !cfg.crepe_model_path.exists()
    {
        eprintln!(
            "invalid configuration: crepe weights not found at `{}`",
            cfg.crepe_model_path.display()
        );
        return ExitCode::FAILURE;
    }
    let extractor = PitchExtractorBuilder::new(cfg).build();

    let opts = F0StageOptions {
        exp_dir: args.exp_dir,
        workers: args.workers,
        method,
        batch_or_hop: args.batch_or_hop,
    };

    match run_f0_stage(&opts, &extractor) {
        Ok(summary) => {
            println!(
                "extract-f0 finished: done {} skipped {} rejected {} failed {}",
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
