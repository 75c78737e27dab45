use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use rand::{rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Engine, EngineError, IncrementalParams, RefineParams, SearchParams};
use crate::session::{NodeId, NodeValues, Session};

// Stop searching after this many iterations without a better candidate
const PATIENCE: usize = 5;

// Activation used by every output node of the prototype engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeuronKind {
    Dense,
    Rnn,
    Lstm,
    Cnn,
    Dropout,
    BatchNorm,
    Attention,
    Nca,
}

impl FromStr for NeuronKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dense" => Ok(NeuronKind::Dense),
            "rnn" => Ok(NeuronKind::Rnn),
            "lstm" => Ok(NeuronKind::Lstm),
            "cnn" => Ok(NeuronKind::Cnn),
            "dropout" => Ok(NeuronKind::Dropout),
            "batch_norm" => Ok(NeuronKind::BatchNorm),
            "attention" => Ok(NeuronKind::Attention),
            "nca" => Ok(NeuronKind::Nca),
            other => Err(EngineError::UnknownNeuronKind(other.to_string())),
        }
    }
}

impl NeuronKind {
    fn activate(self, z: f64) -> f64 {
        match self {
            NeuronKind::Dense | NeuronKind::Dropout | NeuronKind::BatchNorm => z,
            NeuronKind::Rnn | NeuronKind::Lstm | NeuronKind::Nca => z.tanh(),
            NeuronKind::Cnn => {
                if z > 0.0 {
                    z
                } else {
                    0.01 * z
                }
            }
            NeuronKind::Attention => 1.0 / (1.0 + (-z).exp()),
        }
    }

    // Derivative at pre-activation `z` with output `y`
    fn derivative(self, z: f64, y: f64) -> f64 {
        match self {
            NeuronKind::Dense | NeuronKind::Dropout | NeuronKind::BatchNorm => 1.0,
            NeuronKind::Rnn | NeuronKind::Lstm | NeuronKind::Nca => 1.0 - y * y,
            NeuronKind::Cnn => {
                if z > 0.0 {
                    1.0
                } else {
                    0.01
                }
            }
            NeuronKind::Attention => y * (1.0 - y),
        }
    }
}

fn parse_kinds(kinds: &[String]) -> Result<Vec<NeuronKind>, EngineError> {
    if kinds.is_empty() {
        return Err(EngineError::NoCandidateKinds);
    }
    kinds.iter().map(|kind| kind.parse()).collect()
}

// A session flattened onto the declared node order
struct Example {
    inputs: Vec<f64>,
    targets: Vec<f64>,
}

// Reference engine: every output node is one neuron connected to every input.
// Trained with the delta rule. Timesteps are accepted but a single pass is always run,
// since the graph has no recurrent edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrototypeEngine {
    input_nodes: Vec<NodeId>,
    output_nodes: Vec<NodeId>,
    kind: NeuronKind,
    // Row-major, one row of input weights per output node
    weights: Vec<f64>,
    biases: Vec<f64>,
    learning_rate: f64,
    seed: u64,
    // Connections already attempted by `grow_connections`, as (output, input) positions
    #[serde(skip)]
    tried_connections: HashSet<(usize, usize)>,
}

impl PrototypeEngine {
    pub fn new(seed: u64) -> Self {
        PrototypeEngine {
            input_nodes: Vec::new(),
            output_nodes: Vec::new(),
            kind: NeuronKind::Dense,
            weights: Vec::new(),
            biases: Vec::new(),
            learning_rate: 0.01,
            seed,
            tried_connections: HashSet::new(),
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn kind(&self) -> NeuronKind {
        self.kind
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|e| EngineError::Other(e.to_string()))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| EngineError::Other(e.to_string()))
    }

    fn reset_weights(&mut self) {
        self.weights = vec![0.0; self.input_nodes.len() * self.output_nodes.len()];
        self.biases = vec![0.0; self.output_nodes.len()];
        self.tried_connections.clear();
    }

    fn dense_inputs(&self, inputs: &NodeValues) -> Result<Vec<f64>, EngineError> {
        let dense: Vec<f64> = self
            .input_nodes
            .iter()
            .map(|id| inputs.get(id).copied().unwrap_or(0.0))
            .collect();
        let matched = self
            .input_nodes
            .iter()
            .filter(|&&id| inputs.contains_key(&id))
            .count();
        if matched != inputs.len() {
            if let Some(&id) = inputs.keys().find(|&&id| !self.input_nodes.contains(&id)) {
                return Err(EngineError::UndeclaredNode(id));
            }
        }
        Ok(dense)
    }

    fn examples(&self, sessions: &[Session]) -> Result<Vec<Example>, EngineError> {
        sessions
            .iter()
            .map(|session| {
                let targets = self
                    .output_nodes
                    .iter()
                    .map(|id| session.expected_output.get(id).copied().unwrap_or(0.0))
                    .collect();
                Ok(Example {
                    inputs: self.dense_inputs(&session.input_variables)?,
                    targets,
                })
            })
            .collect()
    }

    fn pre_activation(&self, output: usize, inputs: &[f64]) -> f64 {
        let row = &self.weights[output * inputs.len()..(output + 1) * inputs.len()];
        self.biases[output] + row.iter().zip(inputs).map(|(w, x)| w * x).sum::<f64>()
    }

    fn outputs(&self, inputs: &[f64]) -> Vec<f64> {
        (0..self.output_nodes.len())
            .map(|output| self.kind.activate(self.pre_activation(output, inputs)))
            .collect()
    }

    // One delta rule step on a single example
    fn update(&mut self, example: &Example) {
        let n_inputs = example.inputs.len();
        for output in 0..self.output_nodes.len() {
            let z = self.pre_activation(output, &example.inputs);
            let y = self.kind.activate(z);
            let step = self.learning_rate * (example.targets[output] - y) * self.kind.derivative(z, y);
            if step == 0.0 {
                continue;
            }
            let row = &mut self.weights[output * n_inputs..(output + 1) * n_inputs];
            row.iter_mut()
                .zip(&example.inputs)
                .for_each(|(w, x)| *w += step * x);
            self.biases[output] += step;
        }
    }

    fn train_epoch(&mut self, examples: &[Example]) {
        for example in examples {
            self.update(example);
        }
    }

    // The predicted class matches: arg-max for several outputs, nearest integer for one
    fn is_exact(&self, example: &Example) -> bool {
        let outputs = self.outputs(&example.inputs);
        if outputs.len() == 1 {
            return (outputs[0] - example.targets[0]).abs() < 0.5;
        }
        position_of_max(&outputs) == position_of_max(&example.targets)
    }

    // Percentage of examples whose class is predicted exactly
    fn exactness(&self, examples: &[&Example]) -> f64 {
        if examples.is_empty() {
            return 0.0;
        }
        let exact = examples.par_iter().filter(|example| self.is_exact(example)).count();
        100.0 * exact as f64 / examples.len() as f64
    }

    // Fraction of examples whose every output lies within `tolerance` of its target
    fn acceptable_fraction(&self, examples: &[Example], tolerance: f64) -> f64 {
        if examples.is_empty() {
            return 0.0;
        }
        let acceptable = examples
            .par_iter()
            .filter(|example| {
                self.outputs(&example.inputs)
                    .iter()
                    .zip(&example.targets)
                    .all(|(y, t)| (y - t).abs() <= tolerance)
            })
            .count();
        acceptable as f64 / examples.len() as f64
    }

    fn squared_error(&self, examples: &[Example]) -> f64 {
        examples
            .par_iter()
            .map(|example| {
                self.outputs(&example.inputs)
                    .iter()
                    .zip(&example.targets)
                    .map(|(y, t)| (y - t) * (y - t))
                    .sum::<f64>()
            })
            .sum()
    }

    // Search score: acceptable predictions first, squared error as a tie-breaker
    fn search_score(&self, examples: &[Example], tolerance: f64) -> (f64, f64) {
        (
            self.acceptable_fraction(examples, tolerance),
            -self.squared_error(examples),
        )
    }
}

fn position_of_max(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

fn better(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 > b.0 || (a.0 == b.0 && a.1 > b.1)
}

impl Engine for PrototypeEngine {
    fn declare_input_nodes(&mut self, ids: &[NodeId]) {
        self.input_nodes = ids.to_vec();
        self.reset_weights();
    }

    fn declare_output_nodes(&mut self, ids: &[NodeId]) {
        self.output_nodes = ids.to_vec();
        self.reset_weights();
    }

    fn run_forward(
        &mut self,
        inputs: &NodeValues,
        _timesteps: usize,
    ) -> Result<NodeValues, EngineError> {
        let inputs = self.dense_inputs(inputs)?;
        Ok(self
            .output_nodes
            .iter()
            .copied()
            .zip(self.outputs(&inputs))
            .collect())
    }

    // Each iteration trains one copy per candidate kind in parallel and keeps the best,
    // stopping early once several iterations bring no improvement.
    fn search_architecture(
        &mut self,
        sessions: &[Session],
        params: &SearchParams,
    ) -> Result<(), EngineError> {
        let kinds = parse_kinds(params.candidate_kinds)?;
        let examples = self.examples(sessions)?;
        let tolerance = params.forgiveness_threshold;

        let mut best_score = self.search_score(&examples, tolerance);
        let mut iterations_since_improvement = 0;
        for iteration in 0..params.max_iterations {
            let candidate = kinds
                .par_iter()
                .map(|&kind| {
                    let mut candidate = self.clone();
                    candidate.kind = kind;
                    for _ in 0..params.weight_update_iterations {
                        candidate.train_epoch(&examples);
                    }
                    let score = candidate.search_score(&examples, tolerance);
                    (score, candidate)
                })
                .reduce_with(|a, b| if better(b.0, a.0) { b } else { a });

            match candidate {
                Some((score, candidate)) if better(score, best_score) => {
                    tracing::debug!(
                        "Search iteration {}: {:?} accepts {:.1}% of sessions",
                        iteration,
                        candidate.kind,
                        100.0 * score.0
                    );
                    *self = candidate;
                    best_score = score;
                    iterations_since_improvement = 0;
                }
                _ => iterations_since_improvement += 1,
            }
            if iterations_since_improvement >= PATIENCE {
                break;
            }
        }
        Ok(())
    }

    // Samples sessions and nudges single connections towards each sample's target.
    // A nudge is kept only if it raises exactness on the sample; a round ends once the
    // sample's exactness reaches the improvement threshold.
    fn refine(&mut self, sessions: &[Session], params: &RefineParams) -> Result<(), EngineError> {
        let examples = self.examples(sessions)?;
        if examples.is_empty() || self.weights.is_empty() {
            return Ok(());
        }
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let n_inputs = self.input_nodes.len();
        let mut accepted = 0;

        for _ in 0..params.max_rounds {
            let sample: Vec<&Example> = examples
                .choose_multiple(&mut rng, params.sample_size)
                .collect();
            let mut exactness = self.exactness(&sample);

            'round: for example in &sample {
                for _ in 0..params.trials_per_sample {
                    if exactness >= params.improvement_threshold {
                        break 'round;
                    }
                    let output = rng.gen_range(0..self.output_nodes.len());
                    let input = rng.gen_range(0..n_inputs);
                    let z = self.pre_activation(output, &example.inputs);
                    let y = self.kind.activate(z);
                    let step = 10.0
                        * self.learning_rate
                        * (example.targets[output] - y)
                        * self.kind.derivative(z, y)
                        * example.inputs[input];
                    if step == 0.0 {
                        continue;
                    }

                    let index = output * n_inputs + input;
                    self.weights[index] += step;
                    let trial = self.exactness(&sample);
                    if trial > exactness {
                        exactness = trial;
                        accepted += 1;
                    } else {
                        self.weights[index] -= step;
                    }
                }
            }
        }
        tracing::debug!("Refinement accepted {} connection changes", accepted);
        Ok(())
    }

    fn grow_connections(
        &mut self,
        sessions: &[Session],
        max_attempts: usize,
    ) -> Result<(), EngineError> {
        let examples = self.examples(sessions)?;
        if examples.is_empty() || self.weights.is_empty() {
            return Ok(());
        }
        let mut rng = SmallRng::seed_from_u64(self.seed.wrapping_add(1));
        let n_inputs = self.input_nodes.len();
        let total = self.weights.len();
        let all: Vec<&Example> = examples.iter().collect();
        let mut exactness = self.exactness(&all);
        let mut error = self.squared_error(&examples);
        let mut grown = 0;

        for _ in 0..max_attempts {
            if self.tried_connections.len() >= total {
                break;
            }
            // Draw until an untried connection comes up
            let connection = loop {
                let candidate = (rng.gen_range(0..self.output_nodes.len()), rng.gen_range(0..n_inputs));
                if self.tried_connections.insert(candidate) {
                    break candidate;
                }
            };
            let (output, input) = connection;

            // Average delta rule gradient of this one weight over every example
            let gradient = examples
                .par_iter()
                .map(|example| {
                    let z = self.pre_activation(output, &example.inputs);
                    let y = self.kind.activate(z);
                    (example.targets[output] - y) * self.kind.derivative(z, y) * example.inputs[input]
                })
                .sum::<f64>()
                / examples.len() as f64;
            let step = self.learning_rate * n_inputs as f64 * gradient;
            if step == 0.0 {
                continue;
            }

            let index = output * n_inputs + input;
            self.weights[index] += step;
            let trial_exactness = self.exactness(&all);
            let trial_error = self.squared_error(&examples);
            if trial_exactness >= exactness && trial_error < error {
                exactness = trial_exactness;
                error = trial_error;
                grown += 1;
            } else {
                self.weights[index] -= step;
            }
        }
        tracing::debug!(
            "Grew {} connections, exactness now {:.1}%",
            grown,
            exactness
        );
        Ok(())
    }

    // Fits sessions one at a time. Each attempt trains a copy with the next candidate kind
    // on the session alone and is adopted once it reproduces the session's class.
    fn learn_incremental(
        &mut self,
        sessions: &[Session],
        params: &IncrementalParams,
    ) -> Result<(), EngineError> {
        let kinds = parse_kinds(params.candidate_kinds)?;
        let examples = self.examples(sessions)?;

        for (index, example) in examples.iter().enumerate() {
            if self.is_exact(example) {
                continue;
            }
            let mut fitted = false;
            for attempt in 0..params.max_attempts_per_session {
                let mut candidate = self.clone();
                if attempt > 0 {
                    candidate.kind = kinds[(attempt - 1) % kinds.len()];
                }
                for _ in 0..params.attempt_budget {
                    candidate.update(example);
                }
                if candidate.is_exact(example) {
                    *self = candidate;
                    fitted = true;
                    break;
                }
            }
            if !fitted {
                tracing::debug!("Session {} could not be fitted incrementally", index);
            }
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), EngineError> {
        let save_error = |reason: String| EngineError::Save {
            path: path.display().to_string(),
            reason,
        };
        let file = File::create(path).map_err(|e| save_error(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| save_error(e.to_string()))?;
        writer.flush().map_err(|e| save_error(e.to_string()))
    }
}
