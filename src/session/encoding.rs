use serde::{Deserialize, Serialize};

use crate::evaluate::{argmax, class_index, softmax};
use crate::session::{NodeId, NodeValues, NUM_CLASSES, ONE_HOT_BASE};

// How a digit label is expressed on the engine's output nodes.
// One scheme is chosen per run; mixing them would change which nodes the engine must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputEncoding {
    // Ten nodes 80001..=80010, the true digit's node is 1.0 and the rest 0.0
    #[default]
    OneHot,
    // A single node 80001 holding the label value itself
    RawLabel,
}

impl OutputEncoding {
    pub fn output_nodes(self) -> Vec<NodeId> {
        match self {
            OutputEncoding::OneHot => (0..NUM_CLASSES as NodeId)
                .map(|digit| ONE_HOT_BASE + digit)
                .collect(),
            OutputEncoding::RawLabel => vec![ONE_HOT_BASE],
        }
    }

    pub fn expected_output(self, label: u8) -> NodeValues {
        match self {
            OutputEncoding::OneHot => self
                .output_nodes()
                .into_iter()
                .map(|id| (id, if id == ONE_HOT_BASE + label as NodeId { 1.0 } else { 0.0 }))
                .collect(),
            OutputEncoding::RawLabel => NodeValues::from([(ONE_HOT_BASE, label as f64)]),
        }
    }

    // The engine outputs restricted to this encoding's nodes. Hidden nodes are dropped.
    fn scores(self, outputs: &NodeValues) -> NodeValues {
        self.output_nodes()
            .into_iter()
            .filter_map(|id| outputs.get(&id).map(|&score| (id, score)))
            .collect()
    }

    // What gets reported next to a prediction: softmax over the one-hot nodes,
    // or the raw node value as is
    pub fn probabilities(self, outputs: &NodeValues) -> NodeValues {
        match self {
            OutputEncoding::OneHot => softmax(&self.scores(outputs)),
            OutputEncoding::RawLabel => self.scores(outputs),
        }
    }

    // Turn raw engine outputs back into a digit.
    // Returns None if the outputs carry none of this encoding's nodes.
    pub fn decode(self, outputs: &NodeValues) -> Option<u8> {
        match self {
            OutputEncoding::OneHot => argmax(&self.probabilities(outputs)).and_then(class_index),
            OutputEncoding::RawLabel => {
                let value = *outputs.get(&ONE_HOT_BASE)?;
                if value.is_nan() {
                    return None;
                }
                Some(value.round().clamp(0.0, (NUM_CLASSES - 1) as f64) as u8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot_label_three() {
        let expected = OutputEncoding::OneHot.expected_output(3);
        assert_eq!(expected.len(), 10);
        assert_eq!(expected[&80004], 1.0);
        for id in [80001, 80002, 80003, 80005, 80006, 80007, 80008, 80009, 80010] {
            assert_eq!(expected[&id], 0.0, "node {}", id);
        }
    }

    #[test]
    fn test_raw_label_single_node() {
        let expected = OutputEncoding::RawLabel.expected_output(7);
        assert_eq!(expected, NodeValues::from([(80001, 7.0)]));
        assert_eq!(OutputEncoding::RawLabel.output_nodes(), [80001]);
    }

    #[test]
    fn test_decode_inverts_expected_output() {
        for encoding in [OutputEncoding::OneHot, OutputEncoding::RawLabel] {
            for label in 0..10 {
                let outputs = encoding.expected_output(label);
                assert_eq!(encoding.decode(&outputs), Some(label));
            }
        }
    }

    #[test]
    fn test_decode_raw_label_rounds_and_clamps() {
        let decode = |v: f64| OutputEncoding::RawLabel.decode(&NodeValues::from([(80001, v)]));
        assert_eq!(decode(4.4), Some(4));
        assert_eq!(decode(4.6), Some(5));
        assert_eq!(decode(-3.0), Some(0));
        assert_eq!(decode(42.0), Some(9));
        assert_eq!(decode(f64::NAN), None);
    }

    #[test]
    fn test_decode_ignores_foreign_nodes() {
        let outputs = NodeValues::from([(1, 100.0), (80003, 0.2), (80008, 0.9)]);
        assert_eq!(OutputEncoding::OneHot.decode(&outputs), Some(7));
        assert_eq!(OutputEncoding::OneHot.decode(&NodeValues::new()), None);
    }

    #[test]
    fn test_probabilities_skip_hidden_nodes() {
        let outputs = NodeValues::from([(1, 100.0), (80003, 0.2), (80008, 0.9)]);
        let probs = OutputEncoding::OneHot.probabilities(&outputs);
        assert_eq!(probs.keys().copied().collect::<Vec<_>>(), [80003, 80008]);
        assert!((probs.values().sum::<f64>() - 1.0).abs() < 1e-12);

        let raw = OutputEncoding::RawLabel.probabilities(&NodeValues::from([(3, 1.0), (80001, 4.2)]));
        assert_eq!(raw, NodeValues::from([(80001, 4.2)]));
    }
}
