//! # ViSoLex
//!
//! Lexical normalization for Vietnamese social-media text: finds non-standard
//! words (teencode, missing diacritics, slang) and rewrites them into their
//! standard forms.
//!
//! This crate bundles [`visolex_core`] (span detection and normalization) and
//! [`visolex_trainer`] (datasets and the self-training loop).
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use visolex::core::{
//!     FitData, FitMode, Normalizer, NswDetector, PieceTokenizer, SequenceLabelingModel,
//!     SubwordTokenizer,
//! };
//! use visolex::trainer::{BaselineModel, DataHandler, RawRow, Split, TrainingConfig};
//!
//! # fn main() -> visolex::core::Result<()> {
//! let tokenizer: Arc<dyn SubwordTokenizer> = Arc::new(PieceTokenizer::new());
//! let mut handler = DataHandler::new(Arc::clone(&tokenizer), &TrainingConfig::default());
//! let rows = vec![RawRow {
//!     id: 0,
//!     input: "sao lỗi j".into(),
//!     output: Some("sao lỗi gì".into()),
//! }];
//! let train = handler.build_examples(rows, Split::Train)?;
//!
//! let mut model = BaselineModel::new("baseline", 16, Arc::clone(&tokenizer));
//! model.fit(FitData::new(&train, &train), FitMode::Train)?;
//!
//! let normalizer = Normalizer::with_spacing_cleanup(NswDetector::from_loaded(model, tokenizer))?;
//! let (spans, text) = normalizer.normalize_with_spans("sao lỗi j")?;
//! assert_eq!(text, "sao lỗi gì");
//! assert_eq!((spans[0].start_index, spans[0].end_index), (8, 9));
//! assert_eq!(spans[0].prediction.as_deref(), Some("gì"));
//! # Ok(())
//! # }
//! ```

pub use visolex_core as core;
pub use visolex_trainer as trainer;

pub use visolex_core::{
    Normalized, Normalizer, NswDetector, NswSpan, Result, SubwordTokenizer, VisolexError,
};
pub use visolex_trainer::{SelfTrainer, TrainingConfig, TrainingResult};
