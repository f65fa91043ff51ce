//! Token-level normalization metrics.
//!
//! Only positions with a gold label take part. A position *needs*
//! normalization when its gold label differs from the input token, and the
//! model *normalized* it when its prediction differs from the input token.

use tracing::info;
use visolex_core::{
    EvalRecord, Example, IGNORE_LABEL, Prediction, Result, SequenceLabelingModel, VisolexError,
};

use crate::config::Metric;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    total: usize,
    correct: usize,
    need_norm: usize,
    pred_norm: usize,
    true_pos: usize,
}

impl Counts {
    fn add(&mut self, input: u32, gold: i64, pred: i64) {
        let input = i64::from(input);
        self.total += 1;
        if pred == gold {
            self.correct += 1;
        }
        if gold != input {
            self.need_norm += 1;
        }
        if pred != input {
            self.pred_norm += 1;
            if pred == gold {
                self.true_pos += 1;
            }
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Scores predictions and picks the model-selection metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    metric: Metric,
}

impl Evaluator {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Compares predictions against the gold labels of `rows`, row by row.
    pub fn score(&self, rows: &[Example], predictions: &[Prediction]) -> Result<EvalRecord> {
        if rows.len() != predictions.len() {
            return Err(VisolexError::Training(format!(
                "{} rows but {} predictions",
                rows.len(),
                predictions.len()
            )));
        }

        let mut counts = Counts::default();
        for (row, prediction) in rows.iter().zip(predictions) {
            if row.id != prediction.id || row.len() != prediction.preds.len() {
                return Err(VisolexError::Training(format!(
                    "prediction for row {} does not match row {}",
                    prediction.id, row.id
                )));
            }
            for ((&input, &gold), &pred) in
                row.input_ids.iter().zip(&row.labels).zip(&prediction.preds)
            {
                if gold != IGNORE_LABEL {
                    counts.add(input, gold, pred);
                }
            }
        }

        let precision = ratio(counts.true_pos, counts.pred_norm);
        let recall = ratio(counts.true_pos, counts.need_norm);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let record = EvalRecord {
            precision,
            recall,
            f1_score,
            accuracy: ratio(counts.correct, counts.total),
            perf: 0.0,
        };
        Ok(self.with_perf(record))
    }

    /// Sets `perf` to the configured metric.
    #[must_use]
    pub fn with_perf(&self, mut record: EvalRecord) -> EvalRecord {
        record.perf = match self.metric {
            Metric::Precision => record.precision,
            Metric::Recall => record.recall,
            Metric::F1Score => record.f1_score,
            Metric::Accuracy => record.accuracy,
        };
        record
    }

    /// Runs `model` over `rows` and scores it.
    pub fn evaluate<M>(
        &self,
        model: &M,
        rows: &[Example],
        comment: &str,
    ) -> Result<(EvalRecord, Vec<Prediction>)>
    where
        M: SequenceLabelingModel + ?Sized,
    {
        let predictions = model.predict(rows)?;
        let record = self.score(rows, &predictions)?;
        info!(split = comment, %record, "evaluation");
        Ok((record, predictions))
    }
}
