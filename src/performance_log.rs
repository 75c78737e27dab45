// Records of how well the engine performs, kept apart from diagnostic logging

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    // "session" for one session, "summary" for the whole set
    pub scope: &'static str,
    // Session position, or the number of sessions for a summary
    pub index: usize,
    pub expected: Option<u8>,
    pub predicted: Option<u8>,
    pub correct: bool,
    // Mean absolute difference between outputs and expected outputs
    pub mean_abs_error: f64,
    // Fraction of correct sessions; 1.0 or 0.0 for a single session
    pub accuracy: f64,
}

pub trait PerformanceLog {
    fn record(&mut self, record: &PerformanceRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

// Appends records as CSV rows to `performance.csv` in a log directory
pub struct CsvPerformanceLog {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvPerformanceLog {
    pub const FILE_NAME: &'static str = "performance.csv";

    pub fn create(log_dir: &Path) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| PipelineError::io(log_dir, e))?;
        let path = log_dir.join(Self::FILE_NAME);
        let writer = csv::Writer::from_path(&path)?;
        Ok(CsvPerformanceLog { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PerformanceLog for CsvPerformanceLog {
    fn record(&mut self, record: &PerformanceRecord) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| PipelineError::io(&self.path, e))
    }
}

// Keeps records in memory; handy when nothing should touch the disk
#[derive(Debug, Default)]
pub struct MemoryPerformanceLog {
    pub records: Vec<PerformanceRecord>,
}

impl PerformanceLog for MemoryPerformanceLog {
    fn record(&mut self, record: &PerformanceRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
