// Training sessions: normalized inputs and expected outputs keyed by node ID

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod encoding;
pub use encoding::OutputEncoding;

mod build_sessions;
pub use build_sessions::build_sessions;

pub type NodeId = u32;
pub type NodeValues = BTreeMap<NodeId, f64>;

// First of the ten one-hot output nodes; digit d lives at ONE_HOT_BASE + d
pub const ONE_HOT_BASE: NodeId = 80001;
pub const NUM_CLASSES: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub input_variables: NodeValues,
    pub expected_output: NodeValues,
    pub timesteps: usize,
}

// Everything the engine needs to be set up for a batch of sessions
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSet {
    pub sessions: Vec<Session>,
    // Label of each session, same order as `sessions`
    pub labels: Vec<u8>,
    pub input_nodes: Vec<NodeId>,
    pub output_nodes: Vec<NodeId>,
    pub dimensions: (u32, u32),
}

impl SessionSet {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // Number of sessions per digit
    pub fn class_histogram(&self) -> [usize; NUM_CLASSES as usize] {
        let mut histogram = [0; NUM_CLASSES as usize];
        for &label in &self.labels {
            if let Some(slot) = histogram.get_mut(label as usize) {
                *slot += 1;
            }
        }
        histogram
    }
}

// Pixel `i` (row-major) feeds input node `i + 1`
pub fn input_node_id(pixel_index: usize) -> NodeId {
    pixel_index as NodeId + 1
}

pub fn normalize_pixel(pixel: u8) -> f64 {
    pixel as f64 / 255.0
}

pub fn input_variables(pixels: &[u8]) -> NodeValues {
    pixels
        .iter()
        .enumerate()
        .map(|(i, &pixel)| (input_node_id(i), normalize_pixel(pixel)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pixel() {
        assert_eq!(normalize_pixel(0), 0.0);
        assert_eq!(normalize_pixel(255), 1.0);
        assert!((normalize_pixel(51) - 0.2).abs() < 1e-12);
        assert!(normalize_pixel(100) < normalize_pixel(101));
    }

    #[test]
    fn test_input_variables_are_one_based() {
        let inputs = input_variables(&[0, 255, 51]);
        assert_eq!(inputs.keys().copied().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(inputs[&2], 1.0);
    }

    #[test]
    fn test_class_histogram() {
        let set = SessionSet {
            sessions: Vec::new(),
            labels: vec![3, 3, 0, 9],
            input_nodes: Vec::new(),
            output_nodes: Vec::new(),
            dimensions: (0, 0),
        };
        let histogram = set.class_histogram();
        assert_eq!(histogram[3], 2);
        assert_eq!(histogram[0], 1);
        assert_eq!(histogram[9], 1);
        assert_eq!(histogram.iter().sum::<usize>(), 4);
    }
}
