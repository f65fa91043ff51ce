//! Count-based substitution model.
//!
//! Learns, for every input piece, how often it was normalized to each target
//! piece (weighted by label confidence) and predicts the softmax of those
//! counts. It implements the full [`SequenceLabelingModel`] contract, so it
//! can stand in for the student or the teacher of a self-training run.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;
use visolex_core::{
    EvalRecord, Example, FitData, FitMode, IGNORE_LABEL, Inference, Prediction, Result,
    SENTINEL_INVALID, SequenceLabelingModel, SubwordTokenizer, VisolexError,
};

use crate::evaluate::Evaluator;

/// File holding a saved baseline inside its checkpoint directory.
pub const MODEL_FILE: &str = "model.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BaselineState {
    family: String,
    hidden_size: usize,
    abstain_below: f32,
    /// input piece -> target piece -> accumulated confidence
    counts: HashMap<String, BTreeMap<String, f32>>,
}

/// Distribution over the candidate targets of one input piece.
struct Candidates {
    targets: Vec<String>,
    proba: Vec<f32>,
}

impl Candidates {
    fn best(&self) -> Option<(&str, f32)> {
        self.targets
            .iter()
            .zip(&self.proba)
            .fold(None, |best: Option<(&str, f32)>, (target, &p)| match best {
                Some((_, q)) if q >= p => best,
                _ => Some((target.as_str(), p)),
            })
    }
}

pub struct BaselineModel {
    tokenizer: Arc<dyn SubwordTokenizer>,
    state: BaselineState,
    device: Device,
}

impl BaselineModel {
    pub fn new(
        family: impl Into<String>,
        hidden_size: usize,
        tokenizer: Arc<dyn SubwordTokenizer>,
    ) -> Self {
        Self {
            tokenizer,
            state: BaselineState {
                family: family.into(),
                hidden_size,
                ..BaselineState::default()
            },
            device: Device::Cpu,
        }
    }

    /// Positions whose top probability falls below `threshold` are predicted as
    /// [`SENTINEL_INVALID`] by [`SequenceLabelingModel::predict`].
    pub fn with_abstain_below(mut self, threshold: f32) -> Self {
        self.state.abstain_below = threshold.clamp(0.0, 1.0);
        self
    }

    /// Number of distinct input pieces seen in training.
    pub fn vocabulary_len(&self) -> usize {
        self.state.counts.len()
    }

    fn accumulate(&mut self, rows: &[Example]) {
        for row in rows {
            let sources = self.tokenizer.convert_ids_to_tokens(&row.input_ids);
            let label_ids: Vec<u32> = row
                .labels
                .iter()
                .map(|&l| u32::try_from(l).unwrap_or(0))
                .collect();
            let targets = self.tokenizer.convert_ids_to_tokens(&label_ids);

            for (t, (&label, weight)) in row.labels.iter().zip(row.weights()).enumerate() {
                if label == IGNORE_LABEL || label == SENTINEL_INVALID || *weight <= 0.0 {
                    continue;
                }
                let (Some(source), Some(target)) = (sources.get(t), targets.get(t)) else {
                    continue;
                };
                *self
                    .state
                    .counts
                    .entry(source.clone())
                    .or_default()
                    .entry(target.clone())
                    .or_insert(0.0) += *weight;
            }
        }
    }

    fn candidates(&self, source: &str) -> Result<Option<Candidates>> {
        let Some(targets) = self.state.counts.get(source) else {
            return Ok(None);
        };
        let (targets, counts): (Vec<String>, Vec<f32>) =
            targets.iter().map(|(t, c)| (t.clone(), *c)).unzip();
        let len = counts.len();
        let logits = Tensor::from_vec(counts, (len,), &self.device)?;
        let proba = candle_nn::ops::softmax(&logits, 0)?.to_vec1::<f32>()?;
        Ok(Some(Candidates { targets, proba }))
    }

    /// Best target id, its probability and the full distribution for one piece.
    fn decide(&self, source_id: u32, source: &str) -> Result<(u32, f32, Vec<f32>)> {
        if self.tokenizer.is_special(source) {
            return Ok((source_id, 1.0, vec![1.0]));
        }
        let Some(candidates) = self.candidates(source)? else {
            return Ok((source_id, 1.0, vec![1.0]));
        };
        let Some((target, p)) = candidates.best() else {
            return Ok((source_id, 1.0, vec![1.0]));
        };
        let target_id = self.tokenizer.token_to_id(target).unwrap_or(source_id);
        Ok((target_id, p, candidates.proba))
    }
}

impl SequenceLabelingModel for BaselineModel {
    fn family(&self) -> &str {
        &self.state.family
    }

    fn hidden_size(&self) -> usize {
        self.state.hidden_size
    }

    fn infer(&self, text: &str) -> Result<Inference> {
        let ids = self.tokenizer.encode(text)?;
        let source_tokens = self.tokenizer.convert_ids_to_tokens(&ids);

        let mut is_nsw = Vec::with_capacity(ids.len());
        let mut pred = Vec::with_capacity(ids.len());
        let mut proba = Vec::with_capacity(ids.len());
        for (&id, token) in ids.iter().zip(&source_tokens) {
            let (target, p, _) = self.decide(id, token)?;
            is_nsw.push(u8::from(target != id));
            pred.push(target);
            proba.push(p);
        }

        Ok(Inference {
            source_tokens,
            is_nsw,
            pred,
            proba,
        })
    }

    fn fit(&mut self, data: FitData<'_>, mode: FitMode) -> Result<EvalRecord> {
        if mode == FitMode::Train {
            self.state.counts.clear();
        }
        self.accumulate(data.train);
        self.accumulate(data.unlabeled);
        debug!(
            family = %self.state.family,
            ?mode,
            rows = data.train.len() + data.unlabeled.len(),
            pieces = self.state.counts.len(),
            "fitted baseline"
        );

        let predictions = self.predict(data.train)?;
        Evaluator::default().score(data.train, &predictions)
    }

    fn predict(&self, rows: &[Example]) -> Result<Vec<Prediction>> {
        rows.iter()
            .map(|row| {
                let sources = self.tokenizer.convert_ids_to_tokens(&row.input_ids);
                let mut preds = Vec::with_capacity(row.len());
                let mut proba = Vec::with_capacity(row.len());
                let mut is_nsw = Vec::with_capacity(row.len());
                for (&id, source) in row.input_ids.iter().zip(&sources) {
                    let (target, p, dist) = self.decide(id, source)?;
                    if p < self.state.abstain_below {
                        preds.push(SENTINEL_INVALID);
                        is_nsw.push(0);
                    } else {
                        preds.push(i64::from(target));
                        is_nsw.push(u8::from(target != id));
                    }
                    proba.push(dist);
                }
                Ok(Prediction {
                    id: row.id,
                    input_ids: row.input_ids.clone(),
                    is_nsw,
                    align_index: row.align_index.clone(),
                    preds,
                    proba,
                })
            })
            .collect()
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(MODEL_FILE), serde_json::to_string_pretty(&self.state)?)?;
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(MODEL_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| VisolexError::ModelUnavailable {
            path: dir.to_path_buf(),
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        self.state = serde_json::from_str(&raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visolex_core::PieceTokenizer;

    fn setup() -> (Arc<PieceTokenizer>, BaselineModel) {
        let tokenizer = Arc::new(PieceTokenizer::new());
        let model = BaselineModel::new(
            "baseline",
            16,
            Arc::clone(&tokenizer) as Arc<dyn SubwordTokenizer>,
        );
        (tokenizer, model)
    }

    fn pair(tokenizer: &PieceTokenizer, id: u64, input: &str, output: &str) -> Example {
        let input_ids = tokenizer.encode(input).unwrap();
        let output_ids = tokenizer.encode(output).unwrap();
        let n = input_ids.len();
        let labels = output_ids
            .iter()
            .enumerate()
            .map(|(i, &o)| if i == 0 || i + 1 == n { IGNORE_LABEL } else { i64::from(o) })
            .collect();
        let is_nsw = input_ids.iter().zip(&output_ids).map(|(a, b)| u8::from(a != b)).collect();
        Example::labeled(id, input_ids, is_nsw, vec![0; n], labels)
    }

    #[test]
    fn learns_substitutions() {
        let (tokenizer, mut model) = setup();
        let train = vec![
            pair(&tokenizer, 0, "sao lỗi j", "sao lỗi gì"),
            pair(&tokenizer, 1, "j vậy", "gì vậy"),
        ];
        let record = model.fit(FitData::new(&train, &[]), FitMode::Train).unwrap();
        assert_eq!(record.accuracy, 1.0);

        let inference = model.infer("j thế").unwrap();
        assert_eq!(inference.source_tokens, vec!["<s>", "▁j", "▁thế", "</s>"]);
        assert_eq!(inference.is_nsw, vec![0, 1, 0, 0]);
        assert_eq!(
            tokenizer.convert_ids_to_tokens(&inference.pred[1..2]),
            vec!["▁gì"]
        );
        assert!(inference.validate().is_ok());
    }

    #[test]
    fn softmax_splits_ambiguous_counts() {
        let (tokenizer, mut model) = setup();
        let train = vec![
            pair(&tokenizer, 0, "dc", "được"),
            pair(&tokenizer, 1, "dc", "đọc"),
        ];
        model.fit(FitData::new(&train, &[]), FitMode::Train).unwrap();
        let predictions = model.predict(&train[..1]).unwrap();
        let dist = &predictions[0].proba[1];
        assert_eq!(dist.len(), 2);
        assert!((dist[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn abstains_below_threshold() {
        let (tokenizer, model) = setup();
        let mut model = model.with_abstain_below(0.9);
        let train = vec![
            pair(&tokenizer, 0, "dc", "được"),
            pair(&tokenizer, 1, "dc", "đọc"),
        ];
        model.fit(FitData::new(&train, &[]), FitMode::Train).unwrap();
        let predictions = model.predict(&train).unwrap();
        assert_eq!(predictions[0].preds[1], SENTINEL_INVALID);
        // framing tokens are always certain
        assert_ne!(predictions[0].preds[0], SENTINEL_INVALID);
    }

    #[test]
    fn pseudo_rows_are_weighted() {
        let (tokenizer, mut model) = setup();
        let clean = vec![pair(&tokenizer, 0, "ko", "không")];
        model.fit(FitData::new(&clean, &[]), FitMode::Train).unwrap();

        let mut pseudo = pair(&tokenizer, 1, "ko", "ko");
        pseudo.set_predictions(pseudo.labels.clone(), vec![vec![1.0], vec![0.0], vec![1.0]]);
        model.fit(FitData::new(&[pseudo], &[]), FitMode::TrainPseudo).unwrap();

        let inference = model.infer("ko").unwrap();
        assert_eq!(tokenizer.convert_ids_to_tokens(&inference.pred[1..2]), vec!["▁không"]);
    }

    #[test]
    fn save_and_load() {
        let (tokenizer, mut model) = setup();
        let train = vec![pair(&tokenizer, 0, "ko bít", "không biết")];
        model.fit(FitData::new(&train, &[]), FitMode::Train).unwrap();

        let dir = tempfile::tempdir().unwrap();
        model.save(dir.path()).unwrap();

        let (_, mut restored) = setup();
        restored.load(dir.path()).unwrap();
        assert_eq!(restored.state, model.state);
        assert_eq!(restored.vocabulary_len(), 2);
        assert_eq!(restored.family(), "baseline");
    }

    #[test]
    fn unseen_pieces_map_to_themselves() {
        let (_, model) = setup();
        let inference = model.infer("hello").unwrap();
        assert_eq!(inference.pred.len(), 3);
        assert!(inference.is_nsw.iter().all(|&f| f == 0));
        assert!(inference.proba.iter().all(|&p| p == 1.0));
    }
}
