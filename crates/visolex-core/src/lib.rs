//! # ViSoLex Core
//!
//! Non-standard word (NSW) detection and lexical normalization for informal
//! Vietnamese social-media text. Turns subword-level model output into exact
//! character spans over the input sentence and attaches predicted standard
//! forms to them.
//!
//! ## Quick Start
//!
//! ```rust
//! use visolex_core::align::{align_spans, verify_spans};
//! use visolex_core::tokenizer::PieceTokenizer;
//!
//! let tokenizer = PieceTokenizer::new();
//! let text = "sao lỗi j mà khó chệu dzô cùng";
//! let tokens: Vec<String> = text.split(' ').map(|w| format!("▁{w}")).collect();
//! let is_nsw = [0, 0, 1, 0, 0, 1, 1, 0];
//!
//! let spans = align_spans(&tokenizer, &tokens, &is_nsw).unwrap();
//! verify_spans(text, &spans).unwrap();
//! assert_eq!((spans[0].start_index, spans[0].end_index), (8, 9));
//! assert_eq!(spans[1].nsw, "chệu");
//! ```
pub mod accents;
pub mod align;
pub mod checkpoint;
pub mod detect;
pub mod error;
pub mod model;
pub mod normalize;
pub mod sampling;
pub mod text;
pub mod tokenizer;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary API
pub use align::{CollapsedText, align_spans, concatenate_nsw_spans, verify_spans};
pub use checkpoint::{
    CheckpointKey, CheckpointName, CheckpointSource, CheckpointStore, HttpCheckpointSource,
};
pub use detect::{ModelSource, NswDetector};
pub use error::{Result, VisolexError};
pub use model::{FitData, FitMode, Inference, SequenceLabelingModel};
pub use normalize::{Normalized, Normalizer};
pub use text::{BasicNormalizer, Identity, PostProcessor, SpacingCleanup};
pub use tokenizer::{HfSubwordTokenizer, PieceTokenizer, SubwordTokenizer};
pub use types::{
    EvalRecord, Example, IGNORE_LABEL, NswSpan, Prediction, SENTINEL_INVALID, TrainingMode,
};
