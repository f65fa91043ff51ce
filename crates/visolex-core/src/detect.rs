//! # NSW Detector
//!
//! Wraps a sequence-labeling model's inference call and turns its per-token
//! NSW flags into character spans over the input sentence.
//!
//! The model is loaded lazily from the checkpoint store on the first
//! detection (or an explicit [`NswDetector::load`]). Loading is idempotent
//! and safe to race from several threads.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use crate::align::{CollapsedText, align_spans, concatenate_nsw_spans, verify_spans};
use crate::checkpoint::{CheckpointKey, CheckpointName, CheckpointStore};
use crate::error::{Result, VisolexError};
use crate::model::{Inference, SequenceLabelingModel};
use crate::tokenizer::{SubwordTokenizer, strip_special_tokens};
use crate::types::NswSpan;

/// Where a detector's model weights come from.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub store: CheckpointStore,
    pub key: CheckpointKey,
    pub name: CheckpointName,
}

impl ModelSource {
    /// Loads `student_best` of the run identified by `key`.
    pub fn best(store: CheckpointStore, key: CheckpointKey) -> Self {
        Self {
            store,
            key,
            name: CheckpointName::StudentBest,
        }
    }

    /// Loads `student_last` of the run identified by `key`.
    pub fn last(store: CheckpointStore, key: CheckpointKey) -> Self {
        Self {
            store,
            key,
            name: CheckpointName::StudentLast,
        }
    }
}

/// Detects non-standard words in a sentence.
pub struct NswDetector<M> {
    model: Arc<RwLock<M>>,
    tokenizer: Arc<dyn SubwordTokenizer>,
    source: Option<ModelSource>,
    loaded: Mutex<bool>,
}

impl<M: SequenceLabelingModel> NswDetector<M> {
    /// Creates a detector whose model is restored from `source` on first use.
    pub fn new(model: M, tokenizer: Arc<dyn SubwordTokenizer>, source: ModelSource) -> Self {
        Self {
            model: Arc::new(RwLock::new(model)),
            tokenizer,
            source: Some(source),
            loaded: Mutex::new(false),
        }
    }

    /// Creates a detector around a model that is ready for inference.
    pub fn from_loaded(model: M, tokenizer: Arc<dyn SubwordTokenizer>) -> Self {
        Self::from_shared(Arc::new(RwLock::new(model)), tokenizer)
    }

    /// Creates a detector sharing an already loaded model.
    pub fn from_shared(model: Arc<RwLock<M>>, tokenizer: Arc<dyn SubwordTokenizer>) -> Self {
        Self {
            model,
            tokenizer,
            source: None,
            loaded: Mutex::new(true),
        }
    }

    /// Restores the model from its checkpoint. Later calls only log.
    pub fn load(&self) -> Result<()> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if *loaded {
            debug!("model has already been loaded");
            return Ok(());
        }

        let source = self.source.as_ref().ok_or_else(|| {
            VisolexError::Configuration("detector has no checkpoint to load from".into())
        })?;
        info!(
            checkpoint = %source.name,
            run = %source.key.run_name(),
            "loading model from checkpoints"
        );
        let mut model = self.model.write().unwrap_or_else(PoisonError::into_inner);
        source.store.load(&mut *model, &source.key, source.name)?;
        *loaded = true;
        Ok(())
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        *self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the model over `text` and returns merged NSW spans.
    ///
    /// Every span satisfies `text[start_index..end_index] == nsw` in
    /// character offsets, whatever the spacing of `text`; a span that does
    /// not is an [`VisolexError::Alignment`] error rather than a silent
    /// partial result.
    pub fn detect_nsw(&self, text: &str) -> Result<Vec<NswSpan>> {
        let inference = self.infer(text)?;
        let spans = self.detect_from_inference(text, &inference)?;
        Ok(concatenate_nsw_spans(spans))
    }

    /// Aligns spans over `text` from an inference result computed elsewhere.
    ///
    /// Adjacent spans are left unmerged so each keeps the token index its
    /// prediction is read from.
    pub fn detect_from_inference(
        &self,
        text: &str,
        inference: &Inference,
    ) -> Result<Vec<NswSpan>> {
        inference.validate()?;
        let (tokens, kept) =
            strip_special_tokens(self.tokenizer.as_ref(), &inference.source_tokens);
        let is_nsw: Vec<u8> = kept.iter().map(|&i| inference.is_nsw[i]).collect();
        let spans = align_spans(self.tokenizer.as_ref(), &tokens, &is_nsw)?;
        let spans = CollapsedText::new(text).restore_spans(spans);
        verify_spans(text, &spans)?;
        Ok(spans)
    }

    /// Loads the model if needed and runs one forward pass.
    pub(crate) fn infer(&self, text: &str) -> Result<Inference> {
        if text.trim().is_empty() {
            return Err(VisolexError::EmptyInput);
        }
        self.load()?;
        let model = self.model.read().unwrap_or_else(PoisonError::into_inner);
        let inference = model.infer(text)?;
        inference.validate()?;
        Ok(inference)
    }

    pub(crate) fn tokenizer(&self) -> &dyn SubwordTokenizer {
        self.tokenizer.as_ref()
    }

    /// Shared handle to the underlying model.
    pub fn model(&self) -> Arc<RwLock<M>> {
        Arc::clone(&self.model)
    }
}
