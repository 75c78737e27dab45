// Decision rule applied to raw engine outputs

use serde::Serialize;

use crate::session::{NodeId, NodeValues, NUM_CLASSES, ONE_HOT_BASE};

// Normalized exponentials of every score.
// The maximum is subtracted first so large scores cannot overflow; the result is unchanged.
pub fn softmax(scores: &NodeValues) -> NodeValues {
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: NodeValues = scores
        .iter()
        .map(|(&id, &score)| (id, (score - max).exp()))
        .collect();
    let sum: f64 = exps.values().sum();
    exps.into_iter().map(|(id, e)| (id, e / sum)).collect()
}

// Key of the largest value, or None for an empty map.
// Ties go to the lowest node ID: only a strictly larger value replaces the current best,
// and the map iterates in ascending key order. NaN never wins against a number.
pub fn argmax(values: &NodeValues) -> Option<NodeId> {
    values
        .iter()
        .fold(None, |best: Option<(NodeId, f64)>, (&id, &value)| match best {
            Some((_, best_value))
                if value > best_value || (best_value.is_nan() && !value.is_nan()) =>
            {
                Some((id, value))
            }
            Some(_) => best,
            None => Some((id, value)),
        })
        .map(|(id, _)| id)
}

// Digit represented by a one-hot output node
pub fn class_index(node_id: NodeId) -> Option<u8> {
    let offset = node_id.checked_sub(ONE_HOT_BASE)?;
    (offset < NUM_CLASSES as NodeId).then_some(offset as u8)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    // Position of the session in its session set
    pub session: usize,
    pub expected: Option<u8>,
    pub predicted: Option<u8>,
    pub probabilities: NodeValues,
}

impl Prediction {
    pub fn is_correct(&self) -> bool {
        self.predicted.is_some() && self.predicted == self.expected
    }
}
