// Boundary to the node-graph learning engine.
// The pipeline only hands sessions over and reads output node values back.

use std::path::Path;

use thiserror::Error;

use crate::config::{IncrementalConfig, RefinementConfig, SearchConfig};
use crate::session::{NodeId, NodeValues, Session};

mod prototype;
pub use prototype::{NeuronKind, PrototypeEngine};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown neuron kind '{0}'")]
    UnknownNeuronKind(String),

    #[error("no candidate neuron kinds given")]
    NoCandidateKinds,

    #[error("node {0} was never declared")]
    UndeclaredNode(NodeId),

    #[error("failed to save model to {path}: {reason}")]
    Save { path: String, reason: String },

    #[error("{0}")]
    Other(String),
}

pub struct SearchParams<'a> {
    pub max_iterations: usize,
    pub forgiveness_threshold: f64,
    pub candidate_kinds: &'a [String],
    pub weight_update_iterations: usize,
}

impl<'a> From<&'a SearchConfig> for SearchParams<'a> {
    fn from(config: &'a SearchConfig) -> Self {
        SearchParams {
            max_iterations: config.max_iterations,
            forgiveness_threshold: config.forgiveness_threshold,
            candidate_kinds: &config.neuron_kinds,
            weight_update_iterations: config.weight_update_iterations,
        }
    }
}

pub struct RefineParams {
    pub max_rounds: usize,
    pub sample_size: usize,
    pub trials_per_sample: usize,
    // Percentage
    pub improvement_threshold: f64,
}

impl From<&RefinementConfig> for RefineParams {
    fn from(config: &RefinementConfig) -> Self {
        RefineParams {
            max_rounds: config.max_rounds,
            sample_size: config.sample_size,
            trials_per_sample: config.trials_per_sample,
            improvement_threshold: config.improvement_threshold,
        }
    }
}

pub struct IncrementalParams<'a> {
    pub max_attempts_per_session: usize,
    pub candidate_kinds: &'a [String],
    pub attempt_budget: usize,
}

impl<'a> IncrementalParams<'a> {
    // Falls back to the search kinds when the incremental phase names none
    pub fn new(config: &'a IncrementalConfig, search_kinds: &'a [String]) -> Self {
        let candidate_kinds = if config.neuron_kinds.is_empty() {
            search_kinds
        } else {
            &config.neuron_kinds
        };
        IncrementalParams {
            max_attempts_per_session: config.max_attempts_per_session,
            candidate_kinds,
            attempt_budget: config.attempt_budget,
        }
    }
}

pub trait Engine {
    fn declare_input_nodes(&mut self, ids: &[NodeId]);

    fn declare_output_nodes(&mut self, ids: &[NodeId]);

    // Evaluate the graph on one set of inputs and return every output node's value
    fn run_forward(&mut self, inputs: &NodeValues, timesteps: usize)
        -> Result<NodeValues, EngineError>;

    fn search_architecture(
        &mut self,
        sessions: &[Session],
        params: &SearchParams,
    ) -> Result<(), EngineError>;

    fn refine(&mut self, sessions: &[Session], params: &RefineParams) -> Result<(), EngineError>;

    // Try up to `max_attempts` connections that were never tried before
    fn grow_connections(
        &mut self,
        sessions: &[Session],
        max_attempts: usize,
    ) -> Result<(), EngineError>;

    fn learn_incremental(
        &mut self,
        sessions: &[Session],
        params: &IncrementalParams,
    ) -> Result<(), EngineError>;

    fn save(&self, path: &Path) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_kinds_fall_back_to_search_kinds() {
        let search = SearchConfig::default();
        let mut incremental = IncrementalConfig::default();
        let params = IncrementalParams::new(&incremental, &search.neuron_kinds);
        assert_eq!(params.candidate_kinds, search.neuron_kinds.as_slice());

        incremental.neuron_kinds = vec!["lstm".to_string()];
        let params = IncrementalParams::new(&incremental, &search.neuron_kinds);
        assert_eq!(params.candidate_kinds, ["lstm".to_string()]);
    }
}
