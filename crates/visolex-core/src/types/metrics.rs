use serde::{Deserialize, Serialize};

/// Evaluation metrics of one model on one split at one iteration.
///
/// `perf` is the value of the metric selected for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalRecord {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub perf: f64,
}

impl EvalRecord {
    /// All-zero record, used as the teacher's placeholder before its first iteration.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for EvalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "P={:.4} R={:.4} F1={:.4} Acc={:.4} perf={:.4}",
            self.precision, self.recall, self.f1_score, self.accuracy, self.perf
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_record_roundtrip() {
        let record = EvalRecord::zero();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"f1_score\":0.0"));
        let back: EvalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
