//! # Sequence Labeling Model Interface
//!
//! Student and teacher are two instances of the same capability set:
//! single-sentence inference, batch prediction, fitting and persistence.
//! Neural architectures live behind this trait.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisolexError};
use crate::types::{EvalRecord, Example, Prediction};

/// Output of one forward pass over a sentence.
///
/// Serves both detection (`source_tokens`, `is_nsw`) and normalization
/// (`pred`, `proba`). All four vectors run parallel over the encoded
/// sequence, special tokens included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub source_tokens: Vec<String>,
    pub is_nsw: Vec<u8>,
    /// Predicted token id per position.
    pub pred: Vec<u32>,
    /// Probability of the predicted token per position.
    pub proba: Vec<f32>,
}

impl Inference {
    /// Checks that the parallel vectors agree in length.
    pub fn validate(&self) -> Result<()> {
        let n = self.source_tokens.len();
        if self.is_nsw.len() != n || self.pred.len() != n || self.proba.len() != n {
            return Err(VisolexError::Inference(format!(
                "misaligned model output: {} tokens, {} nsw flags, {} predictions, {} probabilities",
                n,
                self.is_nsw.len(),
                self.pred.len(),
                self.proba.len()
            )));
        }
        Ok(())
    }
}

/// What a `fit` call trains on and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Hard labels from clean data.
    Train,
    /// Soft, confidence-weighted pseudo-labels.
    TrainPseudo,
    /// Short pass on clean data after pseudo-label training.
    Finetune,
}

/// Data handed to a `fit` call.
#[derive(Debug, Clone, Copy)]
pub struct FitData<'a> {
    pub train: &'a [Example],
    pub dev: &'a [Example],
    /// Pseudo-labeled rows an aggregating teacher may learn from.
    pub unlabeled: &'a [Example],
}

impl<'a> FitData<'a> {
    pub fn new(train: &'a [Example], dev: &'a [Example]) -> Self {
        Self {
            train,
            dev,
            unlabeled: &[],
        }
    }

    pub fn with_unlabeled(mut self, unlabeled: &'a [Example]) -> Self {
        self.unlabeled = unlabeled;
        self
    }
}

/// A trainable token-level normalizer.
pub trait SequenceLabelingModel: Send + Sync {
    /// Model family name, e.g. `"visobert"`. Part of the checkpoint key.
    fn family(&self) -> &str;

    /// Width of the hidden representation; the teacher is sized from the student's.
    fn hidden_size(&self) -> usize;

    /// Runs one forward pass over a raw sentence.
    fn infer(&self, text: &str) -> Result<Inference>;

    /// Trains on `data`, weighting tokens by their confidence, and reports train metrics.
    fn fit(&mut self, data: FitData<'_>, mode: FitMode) -> Result<EvalRecord>;

    /// Predicts labels and distributions for every row.
    fn predict(&self, rows: &[Example]) -> Result<Vec<Prediction>>;

    /// Writes the complete model state into `dir`, which already exists.
    fn save(&self, dir: &Path) -> Result<()>;

    /// Restores model state from `dir`.
    fn load(&mut self, dir: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_shape_check() {
        let good = Inference {
            source_tokens: vec!["<s>".into(), "▁j".into(), "</s>".into()],
            is_nsw: vec![0, 1, 0],
            pred: vec![0, 7, 2],
            proba: vec![1.0, 0.9, 1.0],
        };
        assert!(good.validate().is_ok());

        let mut bad = good.clone();
        bad.proba.pop();
        assert!(matches!(bad.validate(), Err(VisolexError::Inference(_))));
    }

    #[test]
    fn fit_data_builder() {
        let rows = vec![Example::unlabeled(0, vec![0, 2], vec![0, 0])];
        let data = FitData::new(&[], &[]).with_unlabeled(&rows);
        assert!(data.train.is_empty());
        assert_eq!(data.unlabeled.len(), 1);
    }
}
