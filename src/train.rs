// Drives an engine through the fixed sequence of training phases.
// Phases run strictly in order against one engine; the first failure ends the run.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::TrainingConfig;
use crate::engine::{Engine, EngineError, IncrementalParams, RefineParams, SearchParams};
use crate::error::{PipelineError, Result};
use crate::evaluate::Prediction;
use crate::performance_log::{PerformanceLog, PerformanceRecord};
use crate::session::{OutputEncoding, SessionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ArchitectureSearch,
    Evaluation,
    MicroRefinement,
    ConnectionGrowth,
    IncrementalLearning,
    FinalEvaluation,
    Persistence,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ArchitectureSearch => "architecture search",
            Phase::Evaluation => "evaluation",
            Phase::MicroRefinement => "micro-refinement",
            Phase::ConnectionGrowth => "connection growth",
            Phase::IncrementalLearning => "incremental learning",
            Phase::FinalEvaluation => "final evaluation",
            Phase::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    pub sessions: usize,
    pub correct: usize,
    pub mean_abs_error: f64,
}

impl EvaluationSummary {
    pub fn accuracy(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.correct as f64 / self.sessions as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub evaluation: EvaluationSummary,
    pub predictions: Vec<Prediction>,
    pub model_path: PathBuf,
}

pub struct Trainer<'a, E: Engine, L: PerformanceLog> {
    engine: &'a mut E,
    log: &'a mut L,
    config: &'a TrainingConfig,
    encoding: OutputEncoding,
    model_path: PathBuf,
}

impl<'a, E: Engine, L: PerformanceLog> Trainer<'a, E, L> {
    pub fn new(
        engine: &'a mut E,
        log: &'a mut L,
        config: &'a TrainingConfig,
        encoding: OutputEncoding,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Trainer {
            engine,
            log,
            config,
            encoding,
            model_path: model_path.into(),
        }
    }

    // Declare the session set's nodes and run every phase in order
    pub fn train(&mut self, set: &SessionSet) -> Result<TrainingReport> {
        self.engine.declare_input_nodes(&set.input_nodes);
        self.engine.declare_output_nodes(&set.output_nodes);
        let sessions = set.sessions.as_slice();
        let config = self.config;

        run_phase(Phase::ArchitectureSearch, || {
            self.engine
                .search_architecture(sessions, &SearchParams::from(&config.search))
        })?;

        let now = Instant::now();
        tracing::info!("Starting {}...", Phase::Evaluation);
        let evaluation = self.evaluate_and_log(set)?;
        tracing::info!(
            "Evaluation: {}/{} correct ({:.2}%), mean absolute error {:.4} [{}ms]",
            evaluation.correct,
            evaluation.sessions,
            100.0 * evaluation.accuracy(),
            evaluation.mean_abs_error,
            now.elapsed().as_millis()
        );

        run_phase(Phase::MicroRefinement, || {
            self.engine
                .refine(sessions, &RefineParams::from(&config.refinement))
        })?;

        run_phase(Phase::ConnectionGrowth, || {
            self.engine
                .grow_connections(sessions, config.growth.max_attempts)
        })?;

        let prefix = &sessions[..config.incremental.session_count.min(sessions.len())];
        run_phase(Phase::IncrementalLearning, || {
            self.engine.learn_incremental(
                prefix,
                &IncrementalParams::new(&config.incremental, &config.search.neuron_kinds),
            )
        })?;

        tracing::info!("Starting {}...", Phase::FinalEvaluation);
        let predictions = self.final_evaluation(set)?;

        let model_path = self.model_path.clone();
        if let Some(dir) = model_path.parent() {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }
        run_phase(Phase::Persistence, || self.engine.save(&model_path))?;
        tracing::info!("Training complete. Model saved to {}", model_path.display());

        Ok(TrainingReport {
            evaluation,
            predictions,
            model_path,
        })
    }

    fn predict(&mut self, set: &SessionSet, index: usize, phase: Phase) -> Result<(Prediction, f64)> {
        let session = &set.sessions[index];
        let outputs = self
            .engine
            .run_forward(&session.input_variables, session.timesteps)
            .map_err(|source| PipelineError::Engine { phase, source })?;

        let errors: Vec<f64> = session
            .expected_output
            .iter()
            .map(|(id, expected)| (outputs.get(id).copied().unwrap_or(0.0) - expected).abs())
            .collect();
        let mean_abs_error = if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f64>() / errors.len() as f64
        };

        let prediction = Prediction {
            session: index,
            expected: set.labels.get(index).copied(),
            predicted: self.encoding.decode(&outputs),
            probabilities: self.encoding.probabilities(&outputs),
        };
        Ok((prediction, mean_abs_error))
    }

    // Run every session forward, log one record per session and one summary record
    fn evaluate_and_log(&mut self, set: &SessionSet) -> Result<EvaluationSummary> {
        let mut correct = 0;
        let mut total_error = 0.0;
        for index in 0..set.len() {
            let (prediction, error) = self.predict(set, index, Phase::Evaluation)?;
            let is_correct = prediction.is_correct();
            correct += is_correct as usize;
            total_error += error;
            self.log.record(&PerformanceRecord {
                scope: "session",
                index,
                expected: prediction.expected,
                predicted: prediction.predicted,
                correct: is_correct,
                mean_abs_error: error,
                accuracy: if is_correct { 1.0 } else { 0.0 },
            })?;
        }

        let summary = EvaluationSummary {
            sessions: set.len(),
            correct,
            mean_abs_error: if set.is_empty() {
                0.0
            } else {
                total_error / set.len() as f64
            },
        };
        self.log.record(&PerformanceRecord {
            scope: "summary",
            index: summary.sessions,
            expected: None,
            predicted: None,
            correct: summary.correct == summary.sessions,
            mean_abs_error: summary.mean_abs_error,
            accuracy: summary.accuracy(),
        })?;
        self.log.flush()?;
        Ok(summary)
    }

    fn final_evaluation(&mut self, set: &SessionSet) -> Result<Vec<Prediction>> {
        let count = self.config.holdout_count.min(set.len());
        let mut predictions = Vec::with_capacity(count);
        for index in 0..count {
            let (prediction, _) = self.predict(set, index, Phase::FinalEvaluation)?;
            tracing::info!(
                "Test {}: Expected: {}, Predicted: {}, Probabilities: {:?}",
                index + 1,
                fmt_class(prediction.expected),
                fmt_class(prediction.predicted),
                prediction.probabilities
            );
            predictions.push(prediction);
        }
        Ok(predictions)
    }
}

fn fmt_class(class: Option<u8>) -> String {
    class.map_or_else(|| "-".to_string(), |c| c.to_string())
}

// Time one blocking engine call and attach the phase to any failure
fn run_phase(phase: Phase, call: impl FnOnce() -> std::result::Result<(), EngineError>) -> Result<()> {
    let now = Instant::now();
    tracing::info!("Starting {}...", phase);
    call().map_err(|source| PipelineError::Engine { phase, source })?;
    tracing::info!("Finished {} [{}ms]", phase, now.elapsed().as_millis());
    Ok(())
}
