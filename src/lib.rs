pub mod audio;
pub mod batch;
pub mod config;
pub mod error;
pub mod f0;
pub mod features;
pub mod logsink;
mod model;
pub mod preprocess;
pub mod segment;
pub mod types;

pub use batch::{BatchRunner, BatchSummary, ItemOutcome};
pub use config::{
    ChunkParams, ExperimentLayout, F0Config, NormalizeParams, SlicerParams, TargetSampleRate,
    FEATURE_SAMPLE_RATE_HZ,
};
pub use error::PrepError;
pub use f0::{
    run_f0_stage, F0Method, F0StageOptions, LazyPitchModel, ModelPitch, PitchExtractor,
    PitchExtractorBuilder, PitchModel,
};
pub use features::{run_feature_stage, FeatureExtractor, FeatureStageOptions};
pub use preprocess::{run_preprocess_stage, PreProcessor, PreprocessOptions};
pub use segment::Slicer;
pub use types::{ChunkTag, PathTriple};
