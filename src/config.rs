// Configuration for the whole pipeline.
// Every budget and directory name lives here and is passed down explicitly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::session::OutputEncoding;

// Which pair of dataset files to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    #[default]
    Train,
    Test,
}

impl Split {
    fn prefix(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "t10k",
        }
    }

    pub fn image_file_name(self) -> String {
        format!("{}-images-idx3-ubyte", self.prefix())
    }

    pub fn label_file_name(self) -> String {
        format!("{}-labels-idx1-ubyte", self.prefix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub root_dir: PathBuf,
    pub output_dir_name: String,
    pub log_dir_name: String,
    pub model_dir_name: String,
    pub model_file_name: String,
    pub label_map_file_name: String,
    pub split: Split,
    pub output_encoding: OutputEncoding,
    // Emit a progress line every this many decoded examples
    pub progress_interval: usize,
    // Only build sessions for the first N label map entries
    pub max_sessions: Option<usize>,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            root_dir: PathBuf::from("mnist"),
            output_dir_name: "output".to_string(),
            log_dir_name: "log".to_string(),
            model_dir_name: "models".to_string(),
            model_file_name: "mnist_model.json".to_string(),
            label_map_file_name: "labels.json".to_string(),
            split: Split::Train,
            output_encoding: OutputEncoding::OneHot,
            progress_interval: 1000,
            max_sessions: None,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    // Read a JSON config; missing fields fall back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn image_file(&self) -> PathBuf {
        self.root_dir.join(self.split.image_file_name())
    }

    pub fn label_file(&self) -> PathBuf {
        self.root_dir.join(self.split.label_file_name())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root_dir.join(&self.output_dir_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join(&self.log_dir_name)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root_dir.join(&self.model_dir_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(&self.model_file_name)
    }
}

// Budgets for each training phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub search: SearchConfig,
    pub refinement: RefinementConfig,
    pub growth: GrowthConfig,
    pub incremental: IncrementalConfig,
    // Number of leading sessions used for the final evaluation
    pub holdout_count: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            search: SearchConfig::default(),
            refinement: RefinementConfig::default(),
            growth: GrowthConfig::default(),
            incremental: IncrementalConfig::default(),
            holdout_count: 10,
        }
    }
}

fn default_neuron_kinds() -> Vec<String> {
    ["dense", "rnn", "cnn", "dropout", "attention"]
        .iter()
        .map(|kind| kind.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_iterations: usize,
    // Fractional error still counted as an acceptable prediction
    pub forgiveness_threshold: f64,
    pub neuron_kinds: Vec<String>,
    pub weight_update_iterations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_iterations: 10,
            forgiveness_threshold: 0.1,
            neuron_kinds: default_neuron_kinds(),
            weight_update_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub max_rounds: usize,
    pub sample_size: usize,
    pub trials_per_sample: usize,
    // Percentage
    pub improvement_threshold: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        RefinementConfig {
            max_rounds: 50,
            sample_size: 20,
            trials_per_sample: 10,
            improvement_threshold: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    // Unique connections only
    pub max_attempts: usize,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        GrowthConfig { max_attempts: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    // Length of the session prefix processed one at a time
    pub session_count: usize,
    pub max_attempts_per_session: usize,
    // Empty means reuse the search phase's kinds
    pub neuron_kinds: Vec<String>,
    pub attempt_budget: usize,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        IncrementalConfig {
            session_count: 10,
            max_attempts_per_session: 10,
            neuron_kinds: Vec::new(),
            attempt_budget: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.image_file(),
            PathBuf::from("mnist/train-images-idx3-ubyte")
        );
        assert_eq!(
            config.label_file(),
            PathBuf::from("mnist/train-labels-idx1-ubyte")
        );
        assert_eq!(
            config.model_path(),
            PathBuf::from("mnist/models/mnist_model.json")
        );
    }

    #[test]
    fn test_split_file_names() {
        assert_eq!(Split::Test.image_file_name(), "t10k-images-idx3-ubyte");
        assert_eq!(Split::Test.label_file_name(), "t10k-labels-idx1-ubyte");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "root_dir": "data", "training": { "search": { "max_iterations": 3 } } }"#,
        )
        .unwrap();
        assert_eq!(config.root_dir, PathBuf::from("data"));
        assert_eq!(config.training.search.max_iterations, 3);
        assert_eq!(config.training.search.forgiveness_threshold, 0.1);
        assert_eq!(config.training.refinement.max_rounds, 50);
        assert_eq!(config.output_encoding, OutputEncoding::OneHot);
    }
}
