// The stages wired together from a config.
// Unpacking and session building only meet through files in the output directory.

use crate::config::PipelineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::mnist::{unpack_mnist, UnpackSummary};
use crate::performance_log::CsvPerformanceLog;
use crate::session::{build_sessions, SessionSet};
use crate::train::{Trainer, TrainingReport};

pub fn unpack(config: &PipelineConfig) -> Result<UnpackSummary> {
    unpack_mnist(
        &config.image_file(),
        &config.label_file(),
        &config.output_dir(),
        &config.label_map_file_name,
        config.progress_interval,
    )
}

pub fn load_sessions(config: &PipelineConfig) -> Result<SessionSet> {
    build_sessions(
        &config.output_dir(),
        &config.label_map_file_name,
        config.output_encoding,
        config.max_sessions,
    )
}

// Build sessions from an unpacked directory and train `engine` on them
pub fn train(config: &PipelineConfig, engine: &mut impl Engine) -> Result<TrainingReport> {
    let sessions = load_sessions(config)?;
    let mut log = CsvPerformanceLog::create(&config.log_dir())?;
    tracing::info!("Logging performance to {}", log.path().display());
    Trainer::new(
        engine,
        &mut log,
        &config.training,
        config.output_encoding,
        config.model_path(),
    )
    .train(&sessions)
}

// Unpack, then train
pub fn run(config: &PipelineConfig, engine: &mut impl Engine) -> Result<TrainingReport> {
    unpack(config)?;
    train(config, engine)
}
