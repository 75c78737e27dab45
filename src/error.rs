// Error type shared by every pipeline stage.
// Any of these aborts the whole run; nothing is retried.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::train::Phase;

#[derive(Error, Debug)]
pub enum PipelineError {
    // Open/read/write/create failures. `index` is set when decoding a specific example.
    #[error("I/O error on {}{}: {source}", path.display(), fmt_index(*index))]
    Io {
        path: PathBuf,
        index: Option<usize>,
        #[source]
        source: io::Error,
    },

    #[error("image and label count mismatch: {images} images, {labels} labels")]
    DatasetMismatch { images: u32, labels: u32 },

    #[error("invalid header in {}: {reason}", path.display())]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("label {label} in {} (example {index}) is not a digit", path.display())]
    InvalidLabel { path: PathBuf, index: usize, label: u8 },

    #[error("{} is {actual:?} pixels, expected {expected:?} like the first example", path.display())]
    DimensionMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    // Raster codec failed to read a file
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    // Writing or persisting a file in some structured format
    #[error("failed to encode {}: {reason}", path.display())]
    Encoding { path: PathBuf, reason: String },

    #[error("label map {} is invalid: {source}", path.display())]
    LabelMap {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("engine failed during {phase}: {source}")]
    Engine {
        phase: Phase,
        #[source]
        source: EngineError,
    },

    #[error("performance log error: {0}")]
    PerformanceLog(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

fn fmt_index(index: Option<usize>) -> String {
    match index {
        Some(i) => format!(" (example {})", i),
        None => String::new(),
    }
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            index: None,
            source,
        }
    }

    pub fn io_at(path: impl Into<PathBuf>, index: usize, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            index: Some(index),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
