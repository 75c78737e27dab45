//! Shared helpers for integration tests
//!
//! - Writing small synthetic IDX datasets
//! - An engine that echoes each session's expected output

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use mnist_pipeline::config::Split;
use mnist_pipeline::engine::{Engine, EngineError, IncrementalParams, RefineParams, SearchParams};
use mnist_pipeline::mnist::header::{IMAGE_MAGIC, LABEL_MAGIC};
use mnist_pipeline::session::{NodeId, NodeValues, Session};

/// Write the training split's IDX files into `dir` with the given header counts.
/// Pixel `p` of example `i` is `(i * 16 + p) % 256`.
pub fn write_idx_dataset(
    dir: &Path,
    image_count: u32,
    label_count: u32,
    rows: u32,
    cols: u32,
    labels: &[u8],
) {
    let mut images = Vec::new();
    for field in [IMAGE_MAGIC, image_count, rows, cols] {
        images.extend_from_slice(&field.to_be_bytes());
    }
    let raster_len = (rows * cols) as usize;
    for i in 0..image_count as usize {
        images.extend((0..raster_len).map(|p| ((i * 16 + p) % 256) as u8));
    }
    fs::write(dir.join(Split::Train.image_file_name()), images).unwrap();

    let mut label_bytes = Vec::new();
    for field in [LABEL_MAGIC, label_count] {
        label_bytes.extend_from_slice(&field.to_be_bytes());
    }
    label_bytes.extend_from_slice(labels);
    fs::write(dir.join(Split::Train.label_file_name()), label_bytes).unwrap();
}

/// Answers every forward pass with the expected output of the matching session
#[derive(Default)]
pub struct EchoEngine {
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    pub sessions: Vec<Session>,
}

impl Engine for EchoEngine {
    fn declare_input_nodes(&mut self, ids: &[NodeId]) {
        self.inputs = ids.to_vec();
    }

    fn declare_output_nodes(&mut self, ids: &[NodeId]) {
        self.outputs = ids.to_vec();
    }

    fn run_forward(&mut self, inputs: &NodeValues, _timesteps: usize) -> Result<NodeValues, EngineError> {
        self.sessions
            .iter()
            .find(|session| &session.input_variables == inputs)
            .map(|session| session.expected_output.clone())
            .ok_or_else(|| EngineError::Other("no session with these inputs".to_string()))
    }

    fn search_architecture(&mut self, sessions: &[Session], _params: &SearchParams) -> Result<(), EngineError> {
        self.sessions = sessions.to_vec();
        Ok(())
    }

    fn refine(&mut self, _sessions: &[Session], _params: &RefineParams) -> Result<(), EngineError> {
        Ok(())
    }

    fn grow_connections(&mut self, _sessions: &[Session], _max_attempts: usize) -> Result<(), EngineError> {
        Ok(())
    }

    fn learn_incremental(&mut self, _sessions: &[Session], _params: &IncrementalParams) -> Result<(), EngineError> {
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, format!("{{\"sessions\": {}}}", self.sessions.len()))
            .map_err(|e| EngineError::Other(e.to_string()))
    }
}
