use serde::{Deserialize, Serialize};

/// A non-standard word located in the original input.
///
/// Offsets are character (Unicode scalar) indices into the input string,
/// end-exclusive. `nsw` is the literal substring at those offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NswSpan {
    /// Position of the first token of the span in the special-token-free sequence.
    pub index: usize,

    /// First character of the span.
    pub start_index: usize,

    /// One past the last character of the span.
    pub end_index: usize,

    /// The non-standard word as it appears in the input.
    pub nsw: String,

    /// Predicted standard form, attached by the normalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,

    /// Probability of the prediction, rounded to 4 decimal places.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,
}

impl NswSpan {
    /// Creates a span without a prediction.
    #[must_use]
    pub fn new(index: usize, start_index: usize, end_index: usize, nsw: impl Into<String>) -> Self {
        Self {
            index,
            start_index,
            end_index,
            nsw: nsw.into(),
            prediction: None,
            confidence_score: None,
        }
    }

    /// Number of characters covered by the span.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_index == self.end_index
    }

    /// Returns `true` if `next` starts exactly where this span ends.
    #[must_use]
    pub fn touches(&self, next: &NswSpan) -> bool {
        self.end_index == next.start_index
    }
}

impl std::fmt::Display for NswSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NSW {:?} [{}..{})", self.nsw, self.start_index, self.end_index)?;
        if let Some(ref prediction) = self.prediction {
            write!(f, " -> {prediction:?}")?;
        }
        if let Some(score) = self.confidence_score {
            write!(f, " ({score:.4})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_length_and_adjacency() {
        let a = NswSpan::new(0, 0, 1, "a");
        let b = NswSpan::new(1, 1, 2, "b");
        let c = NswSpan::new(2, 5, 6, "c");
        assert_eq!(a.len(), 1);
        assert!(!a.is_empty());
        assert!(a.touches(&b));
        assert!(!b.touches(&c));
    }

    #[test]
    fn span_serialization_skips_missing_prediction() {
        let span = NswSpan::new(0, 8, 9, "j");
        let json = serde_json::to_string(&span).unwrap();
        assert_eq!(json, r#"{"index":0,"start_index":8,"end_index":9,"nsw":"j"}"#);

        let mut span = span;
        span.prediction = Some("gì".into());
        span.confidence_score = Some(0.9731);
        let json = serde_json::to_string(&span).unwrap();
        assert!(json.contains(r#""prediction":"gì""#));
        assert!(json.contains(r#""confidence_score":0.9731"#));
    }

    #[test]
    fn span_display() {
        let mut span = NswSpan::new(2, 22, 25, "dzô");
        span.prediction = Some("vô".into());
        span.confidence_score = Some(0.5);
        let display = span.to_string();
        assert!(display.contains("dzô"));
        assert!(display.contains("22..25"));
        assert!(display.contains("0.5000"));
    }
}
