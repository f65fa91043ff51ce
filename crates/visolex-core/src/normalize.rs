//! # Normalizer
//!
//! Predicts the standard form of every token with a single model call and,
//! on request, reports which spans were non-standard together with the
//! replacement and its confidence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::NswDetector;
use crate::error::{Result, VisolexError};
use crate::model::SequenceLabelingModel;
use crate::text::{PostProcessor, SpacingCleanup};
use crate::tokenizer::strip_special_tokens;
use crate::types::NswSpan;

/// Result of [`Normalizer::normalize_sentence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Normalized {
    Text(String),
    Detailed { spans: Vec<NswSpan>, text: String },
}

impl Normalized {
    /// The normalized sentence.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Detailed { text, .. } => text,
        }
    }

    /// Spans with predictions, present only when detection was requested.
    #[must_use]
    pub fn spans(&self) -> Option<&[NswSpan]> {
        match self {
            Self::Text(_) => None,
            Self::Detailed { spans, .. } => Some(spans),
        }
    }
}

/// Rewrites informal sentences into standard Vietnamese.
pub struct Normalizer<M> {
    detector: NswDetector<M>,
    post_processor: Box<dyn PostProcessor>,
}

impl<M: SequenceLabelingModel> Normalizer<M> {
    pub fn new(detector: NswDetector<M>, post_processor: impl PostProcessor + 'static) -> Self {
        Self {
            detector,
            post_processor: Box::new(post_processor),
        }
    }

    /// Builds a normalizer that applies [`SpacingCleanup`] to its output.
    pub fn with_spacing_cleanup(detector: NswDetector<M>) -> Result<Self> {
        Ok(Self::new(detector, SpacingCleanup::new()?))
    }

    /// The detector sharing this normalizer's model.
    pub fn detector(&self) -> &NswDetector<M> {
        &self.detector
    }

    /// Normalizes `text`, optionally attaching the detected NSW spans.
    ///
    /// Detection reuses the same forward pass. Its spans are not merged: each
    /// span's prediction is read from the token right after its index, the
    /// offset of the leading `<s>`.
    pub fn normalize_sentence(&self, text: &str, detect_nsw: bool) -> Result<Normalized> {
        let inference = self.detector.infer(text)?;
        let tokenizer = self.detector.tokenizer();
        let decoded = tokenizer.convert_ids_to_tokens(&inference.pred);

        let (pred_tokens, _) = strip_special_tokens(tokenizer, &decoded);
        let normalized = self
            .post_processor
            .process(&tokenizer.convert_tokens_to_string(&pred_tokens)?);

        if !detect_nsw {
            return Ok(Normalized::Text(normalized));
        }

        let mut spans = self.detector.detect_from_inference(text, &inference)?;
        for span in &mut spans {
            let position = span.index + 1;
            let (Some(token), Some(&proba)) = (decoded.get(position), inference.proba.get(position))
            else {
                return Err(VisolexError::Inference(format!(
                    "no prediction at position {position} for span {span}"
                )));
            };
            span.prediction =
                Some(tokenizer.convert_tokens_to_string(std::slice::from_ref(token))?);
            span.confidence_score = Some(round4(proba));
        }
        debug!(spans = spans.len(), "normalized sentence");

        Ok(Normalized::Detailed {
            spans,
            text: normalized,
        })
    }

    /// Normalizes `text` without span detection.
    pub fn normalize(&self, text: &str) -> Result<String> {
        match self.normalize_sentence(text, false)? {
            Normalized::Text(text) | Normalized::Detailed { text, .. } => Ok(text),
        }
    }

    /// Normalizes `text` and returns the predicted spans alongside.
    pub fn normalize_with_spans(&self, text: &str) -> Result<(Vec<NswSpan>, String)> {
        match self.normalize_sentence(text, true)? {
            Normalized::Detailed { spans, text } => Ok((spans, text)),
            Normalized::Text(text) => Ok((Vec::new(), text)),
        }
    }
}

fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}
