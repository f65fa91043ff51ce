//! Scripted model used by the detector and normalizer tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::model::{FitData, FitMode, Inference, SequenceLabelingModel};
use crate::tokenizer::{BOS_TOKEN, EOS_TOKEN, PieceTokenizer, SubwordTokenizer, WORD_BOUNDARY};
use crate::types::{EvalRecord, Example, Prediction};

/// Flags fixed words as NSW and predicts fixed replacements.
pub(crate) struct ScriptedModel {
    tokenizer: Arc<PieceTokenizer>,
    flagged: HashSet<String>,
    pieces: HashMap<String, Vec<String>>,
    replacements: HashMap<String, (String, f32)>,
    infer_calls: AtomicUsize,
    loads: usize,
}

impl ScriptedModel {
    /// Flags every piece whose text (without boundary marker) is in `words`.
    pub(crate) fn flagging(words: &[&str]) -> Self {
        Self {
            tokenizer: Arc::new(PieceTokenizer::new()),
            flagged: words.iter().map(|w| w.to_string()).collect(),
            pieces: HashMap::new(),
            replacements: HashMap::new(),
            infer_calls: AtomicUsize::new(0),
            loads: 0,
        }
    }

    /// Splits `word` into the given pieces instead of a single `▁word`.
    pub(crate) fn with_pieces(mut self, word: &str, pieces: &[&str]) -> Self {
        self.pieces
            .insert(word.to_string(), pieces.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Predicts `replacement` with probability `proba` wherever `piece` occurs.
    pub(crate) fn with_replacement(mut self, piece: &str, replacement: &str, proba: f32) -> Self {
        self.replacements
            .insert(piece.to_string(), (replacement.to_string(), proba));
        self
    }

    pub(crate) fn tokenizer(&self) -> Arc<dyn SubwordTokenizer> {
        Arc::clone(&self.tokenizer) as Arc<dyn SubwordTokenizer>
    }

    pub(crate) fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads
    }

    fn segment(&self, text: &str) -> Vec<String> {
        let mut tokens = vec![BOS_TOKEN.to_string()];
        for word in text.split_whitespace() {
            match self.pieces.get(word) {
                Some(pieces) => tokens.extend(pieces.iter().cloned()),
                None => tokens.push(format!("{WORD_BOUNDARY}{word}")),
            }
        }
        tokens.push(EOS_TOKEN.to_string());
        tokens
    }
}

impl SequenceLabelingModel for ScriptedModel {
    fn family(&self) -> &str {
        "scripted"
    }

    fn hidden_size(&self) -> usize {
        8
    }

    fn infer(&self, text: &str) -> Result<Inference> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        let source_tokens = self.segment(text);
        let mut is_nsw = Vec::with_capacity(source_tokens.len());
        let mut pred = Vec::with_capacity(source_tokens.len());
        let mut proba = Vec::with_capacity(source_tokens.len());
        for token in &source_tokens {
            let bare = token.trim_start_matches(WORD_BOUNDARY);
            is_nsw.push(u8::from(self.flagged.contains(bare)));
            let (target, p) = self
                .replacements
                .get(token)
                .map_or((token.as_str(), 1.0), |(r, p)| (r.as_str(), *p));
            pred.push(self.tokenizer.insert_piece(target));
            proba.push(p);
        }
        Ok(Inference {
            source_tokens,
            is_nsw,
            pred,
            proba,
        })
    }

    fn fit(&mut self, _data: FitData<'_>, _mode: FitMode) -> Result<EvalRecord> {
        Ok(EvalRecord::zero())
    }

    fn predict(&self, _rows: &[Example]) -> Result<Vec<Prediction>> {
        Ok(Vec::new())
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let mut flagged: Vec<&String> = self.flagged.iter().collect();
        flagged.sort();
        fs::write(dir.join("scripted.json"), serde_json::to_string(&flagged)?)?;
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        let flagged: Vec<String> =
            serde_json::from_str(&fs::read_to_string(dir.join("scripted.json"))?)?;
        self.flagged = flagged.into_iter().collect();
        self.loads += 1;
        Ok(())
    }
}
