use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnist_pipeline::config::Split;
use mnist_pipeline::engine::PrototypeEngine;
use mnist_pipeline::session::OutputEncoding;
use mnist_pipeline::{pipeline, PipelineConfig};

#[derive(Parser)]
#[command(about = "Unpack the MNIST dataset and train a node-graph engine on it")]
struct Cli {
    /// JSON file overriding the default configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dataset root holding the raw IDX files
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Use the t10k files instead of the training files
    #[arg(long, global = true)]
    test_split: bool,

    /// Single raw-label output node instead of ten one-hot nodes
    #[arg(long, global = true)]
    raw_label: bool,

    /// Only build sessions for the first N examples
    #[arg(long, global = true)]
    max_sessions: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode the IDX files into PNG rasters and a label map
    Unpack,
    /// Build sessions from unpacked rasters and summarize them
    Inspect,
    /// Train the bundled prototype engine on unpacked rasters
    Train {
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Unpack, then train
    Run {
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = cli.root {
        config.root_dir = root;
    }
    if cli.test_split {
        config.split = Split::Test;
    }
    if cli.raw_label {
        config.output_encoding = OutputEncoding::RawLabel;
    }
    if cli.max_sessions.is_some() {
        config.max_sessions = cli.max_sessions;
    }

    let now = Instant::now();
    match cli.command {
        Command::Unpack => {
            let summary = pipeline::unpack(&config).context("failed to unpack MNIST data")?;
            tracing::info!(
                "Unpacked {} examples of {}x{} pixels",
                summary.count,
                summary.rows,
                summary.cols
            );
        }
        Command::Inspect => {
            let set = pipeline::load_sessions(&config).context("failed to build sessions")?;
            tracing::info!(
                "{} sessions, {} input nodes, {} output nodes, rasters {}x{}",
                set.len(),
                set.input_nodes.len(),
                set.output_nodes.len(),
                set.dimensions.0,
                set.dimensions.1
            );
            for (digit, count) in set.class_histogram().iter().enumerate() {
                tracing::info!("Digit {}: {} sessions", digit, count);
            }
        }
        Command::Train { seed } => {
            let mut engine = PrototypeEngine::new(seed);
            let report =
                pipeline::train(&config, &mut engine).context("failed to train on MNIST data")?;
            log_report(&report);
        }
        Command::Run { seed } => {
            let mut engine = PrototypeEngine::new(seed);
            let report = pipeline::run(&config, &mut engine).context("MNIST pipeline failed")?;
            log_report(&report);
        }
    }
    tracing::info!("Done [{}ms]", now.elapsed().as_millis());
    Ok(())
}

fn log_report(report: &mnist_pipeline::train::TrainingReport) {
    let correct = report.predictions.iter().filter(|p| p.is_correct()).count();
    tracing::info!(
        "Accuracy = {:.4} over {} sessions, final check {}/{}, model at {}",
        report.evaluation.accuracy(),
        report.evaluation.sessions,
        correct,
        report.predictions.len(),
        report.model_path.display()
    );
}
