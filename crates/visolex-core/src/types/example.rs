use serde::{Deserialize, Serialize};

/// Label a model emits for a position it refuses to pseudo-label.
///
/// Rows carrying it are removed by `PseudoDataset::drop` before training.
pub const SENTINEL_INVALID: i64 = -1;

/// Label for positions excluded from loss and metrics (framing tokens, unaligned words).
pub const IGNORE_LABEL: i64 = -100;

/// One tokenized sentence with its current labels.
///
/// Used both for clean labeled data (weights of `1.0`, no distribution) and
/// for pseudo-labeled rows, where `weights[t]` is always the top probability
/// of `proba[t]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: u64,
    pub input_ids: Vec<u32>,
    pub is_nsw: Vec<u8>,
    /// Index of the source word each token belongs to.
    pub align_index: Vec<usize>,
    pub labels: Vec<i64>,
    proba: Vec<Vec<f32>>,
    weights: Vec<f32>,
}

impl Example {
    /// Creates a clean labeled example with unit confidence on every token.
    #[must_use]
    pub fn labeled(
        id: u64,
        input_ids: Vec<u32>,
        is_nsw: Vec<u8>,
        align_index: Vec<usize>,
        labels: Vec<i64>,
    ) -> Self {
        let weights = vec![1.0; labels.len()];
        Self {
            id,
            input_ids,
            is_nsw,
            align_index,
            labels,
            proba: Vec::new(),
            weights,
        }
    }

    /// Creates an example whose labels are not known yet.
    #[must_use]
    pub fn unlabeled(id: u64, input_ids: Vec<u32>, align_index: Vec<usize>) -> Self {
        let len = input_ids.len();
        Self {
            id,
            input_ids,
            is_nsw: vec![0; len],
            align_index,
            labels: vec![IGNORE_LABEL; len],
            proba: Vec::new(),
            weights: vec![0.0; len],
        }
    }

    /// Overwrites labels and distributions and recomputes the confidence weights.
    pub fn set_predictions(&mut self, labels: Vec<i64>, proba: Vec<Vec<f32>>) {
        self.weights = proba.iter().map(|dist| top_probability(dist)).collect();
        self.labels = labels;
        self.proba = proba;
    }

    /// Per-token label distributions of the last prediction written to this row.
    pub fn proba(&self) -> &[Vec<f32>] {
        &self.proba
    }

    /// Per-token confidence weights.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Returns `true` if any label equals `value`.
    #[must_use]
    pub fn has_label(&self, value: i64) -> bool {
        self.labels.contains(&value)
    }

    /// Returns `true` if any NSW flag equals `value`.
    #[must_use]
    pub fn has_nsw_flag(&self, value: i64) -> bool {
        self.is_nsw.iter().any(|&flag| i64::from(flag) == value)
    }
}

/// Model output for one `Example`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: u64,
    pub input_ids: Vec<u32>,
    pub is_nsw: Vec<u8>,
    pub align_index: Vec<usize>,
    pub preds: Vec<i64>,
    pub proba: Vec<Vec<f32>>,
}

impl Prediction {
    /// Turns the prediction into a pseudo-labeled row.
    #[must_use]
    pub fn into_example(self) -> Example {
        let mut example = Example {
            id: self.id,
            input_ids: self.input_ids,
            is_nsw: self.is_nsw,
            align_index: self.align_index,
            labels: Vec::new(),
            proba: Vec::new(),
            weights: Vec::new(),
        };
        example.set_predictions(self.preds, self.proba);
        example
    }
}

fn top_probability(dist: &[f32]) -> f32 {
    dist.iter().copied().fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_example_has_unit_weights() {
        let ex = Example::labeled(7, vec![0, 5, 6, 2], vec![0, 1, 0, 0], vec![0, 0, 1, 1], vec![
            IGNORE_LABEL,
            9,
            6,
            IGNORE_LABEL,
        ]);
        assert_eq!(ex.weights(), &[1.0, 1.0, 1.0, 1.0]);
        assert!(ex.proba().is_empty());
        assert_eq!(ex.len(), 4);
    }

    #[test]
    fn set_predictions_recomputes_weights() {
        let mut ex = Example::unlabeled(1, vec![0, 5, 2], vec![0, 0, 1]);
        ex.set_predictions(vec![0, 5, 2], vec![
            vec![0.9, 0.1],
            vec![0.3, 0.6, 0.1],
            vec![1.0],
        ]);
        assert_eq!(ex.weights(), &[0.9, 0.6, 1.0]);

        ex.set_predictions(
            vec![0, SENTINEL_INVALID, 2],
            vec![vec![0.2, 0.8], vec![0.5], vec![0.4]],
        );
        assert_eq!(ex.weights(), &[0.8, 0.5, 0.4]);
        assert!(ex.has_label(SENTINEL_INVALID));
    }

    #[test]
    fn prediction_into_example() {
        let pred = Prediction {
            id: 3,
            input_ids: vec![0, 11, 2],
            is_nsw: vec![0, 1, 0],
            align_index: vec![0, 0, 1],
            preds: vec![0, 12, 2],
            proba: vec![vec![1.0], vec![0.25, 0.75], vec![1.0]],
        };
        let ex = pred.into_example();
        assert_eq!(ex.labels, vec![0, 12, 2]);
        assert_eq!(ex.weights(), &[1.0, 0.75, 1.0]);
        assert!(ex.has_nsw_flag(1));
    }
}
