//! Dataset loading for labeled and unlabeled sentence pairs.
//!
//! Datasets are JSON Lines files, one sentence per line:
//!
//! ```text
//! {"id": 0, "input": "sao lỗi j mà khó chệu", "output": "sao lỗi gì mà khó chịu"}
//! {"id": 1, "input": "đẹp wá"}
//! ```
//!
//! `output` is required for the train, dev and test splits.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use oorandom::Rand64;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use visolex_core::accents::remove_accents_ratio;
use visolex_core::text::BasicNormalizer;
use visolex_core::tokenizer::{BOS_TOKEN, EOS_TOKEN};
use visolex_core::{Example, IGNORE_LABEL, Result, SubwordTokenizer, VisolexError};

use crate::config::TrainingConfig;

/// One line of a dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub id: u64,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Which part of the corpus a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Dev,
    Test,
    Unlabeled,
}

impl Split {
    fn is_labeled(self) -> bool {
        !matches!(self, Self::Unlabeled)
    }
}

/// Reads every non-empty line of a JSON Lines file.
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<RawRow>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        VisolexError::Configuration(format!("cannot open dataset {}: {e}", path.display()))
    })?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: RawRow = serde_json::from_str(line).map_err(|e| {
            VisolexError::Configuration(format!("{}:{}: {e}", path.display(), lineno + 1))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Turns raw sentence pairs into tokenized [`Example`]s.
pub struct DataHandler {
    tokenizer: Arc<dyn SubwordTokenizer>,
    lowercase: bool,
    rm_accent_ratio: f32,
    rng: Rand64,
    preprocessor: Option<BasicNormalizer>,
}

impl DataHandler {
    pub fn new(tokenizer: Arc<dyn SubwordTokenizer>, config: &TrainingConfig) -> Self {
        Self {
            tokenizer,
            lowercase: config.lowercase,
            rm_accent_ratio: config.rm_accent_ratio,
            rng: Rand64::new(u128::from(config.seed)),
            preprocessor: None,
        }
    }

    /// Runs every sentence through `preprocessor` (tone placement, emoji and
    /// punctuation splitting) before tokenization.
    pub fn with_preprocessor(mut self, preprocessor: BasicNormalizer) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Loads and tokenizes a dataset file.
    pub fn load_dataset<P: AsRef<Path>>(&mut self, path: P, split: Split) -> Result<Vec<Example>> {
        let raw = load_jsonl(&path)?;
        let total = raw.len();
        let examples = self.build_examples(raw, split)?;
        info!(
            path = %path.as_ref().display(),
            ?split,
            rows = examples.len(),
            skipped = total - examples.len(),
            "loaded dataset"
        );
        Ok(examples)
    }

    /// Tokenizes rows already in memory. Unusable labeled rows are skipped.
    pub fn build_examples(&mut self, rows: Vec<RawRow>, split: Split) -> Result<Vec<Example>> {
        let mut examples = Vec::with_capacity(rows.len());
        for row in rows {
            let example = if split.is_labeled() {
                self.build_labeled(&row, split == Split::Train)?
            } else {
                Some(self.build_unlabeled(&row)?)
            };
            examples.extend(example);
        }
        Ok(examples)
    }

    /// Builds a labeled example, or `None` when the row cannot be aligned word by word.
    pub fn build_labeled(&mut self, row: &RawRow, augment: bool) -> Result<Option<Example>> {
        let Some(output) = row.output.as_deref() else {
            warn!(id = row.id, "labeled row has no output, skipping");
            return Ok(None);
        };
        let output = self.prepare(output);
        let mut input = self.prepare(&row.input);
        if augment && self.rm_accent_ratio > 0.0 {
            input = remove_accents_ratio(&input, self.rm_accent_ratio, &mut self.rng);
        }

        let source_words: Vec<&str> = input.split_whitespace().collect();
        let target_words: Vec<&str> = output.split_whitespace().collect();
        if source_words.len() != target_words.len() {
            warn!(
                id = row.id,
                input = source_words.len(),
                output = target_words.len(),
                "word counts differ, skipping"
            );
            return Ok(None);
        }

        let (bos, eos) = self.framing_ids()?;
        let mut input_ids = vec![bos];
        let mut is_nsw = vec![0];
        let mut align_index = vec![0];
        let mut labels = vec![IGNORE_LABEL];

        for (word_index, (source, target)) in source_words.iter().zip(&target_words).enumerate() {
            let source_ids = self.word_pieces(source)?;
            let target_ids = self.word_pieces(target)?;
            let flag = u8::from(source != target);
            let aligned = source_ids.len() == target_ids.len();
            for (k, &id) in source_ids.iter().enumerate() {
                input_ids.push(id);
                is_nsw.push(flag);
                align_index.push(word_index);
                labels.push(if aligned {
                    i64::from(target_ids[k])
                } else {
                    IGNORE_LABEL
                });
            }
        }

        input_ids.push(eos);
        is_nsw.push(0);
        align_index.push(source_words.len().saturating_sub(1));
        labels.push(IGNORE_LABEL);

        Ok(Some(Example::labeled(row.id, input_ids, is_nsw, align_index, labels)))
    }

    /// Builds an example for the unlabeled pool.
    pub fn build_unlabeled(&mut self, row: &RawRow) -> Result<Example> {
        let input = self.prepare(&row.input);
        let (bos, eos) = self.framing_ids()?;

        let mut input_ids = vec![bos];
        let mut align_index = vec![0];
        let words: Vec<&str> = input.split_whitespace().collect();
        for (word_index, word) in words.iter().enumerate() {
            for id in self.word_pieces(word)? {
                input_ids.push(id);
                align_index.push(word_index);
            }
        }
        input_ids.push(eos);
        align_index.push(words.len().saturating_sub(1));

        Ok(Example::unlabeled(row.id, input_ids, align_index))
    }

    fn prepare(&self, text: &str) -> String {
        match &self.preprocessor {
            Some(preprocessor) => preprocessor.preprocess(text, self.lowercase),
            None if self.lowercase => text.to_lowercase(),
            None => text.to_string(),
        }
    }

    fn framing_ids(&self) -> Result<(u32, u32)> {
        let id = |token: &str| {
            self.tokenizer
                .token_to_id(token)
                .ok_or_else(|| VisolexError::Tokenizer(format!("vocabulary has no {token}")))
        };
        Ok((id(BOS_TOKEN)?, id(EOS_TOKEN)?))
    }

    /// Subword ids of a single word, framing tokens removed.
    fn word_pieces(&self, word: &str) -> Result<Vec<u32>> {
        let ids = self.tokenizer.encode(word)?;
        let tokens = self.tokenizer.convert_ids_to_tokens(&ids);
        Ok(ids
            .into_iter()
            .zip(tokens)
            .filter(|(_, token)| !self.tokenizer.is_special(token))
            .map(|(id, _)| id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use visolex_core::PieceTokenizer;

    fn handler(config: &TrainingConfig) -> (DataHandler, Arc<PieceTokenizer>) {
        let tokenizer = Arc::new(PieceTokenizer::new());
        let handler = DataHandler::new(Arc::clone(&tokenizer) as Arc<dyn SubwordTokenizer>, config);
        (handler, tokenizer)
    }

    fn pair(id: u64, input: &str, output: &str) -> RawRow {
        RawRow {
            id,
            input: input.to_string(),
            output: Some(output.to_string()),
        }
    }

    #[test]
    fn labeled_row_is_framed_and_aligned() {
        let (mut handler, tokenizer) = handler(&TrainingConfig::default());
        let example = handler
            .build_labeled(&pair(7, "Sao lỗi j", "sao lỗi gì"), true)
            .unwrap()
            .unwrap();

        assert_eq!(example.id, 7);
        assert_eq!(example.len(), 5);
        assert_eq!(example.is_nsw, vec![0, 0, 0, 1, 0]);
        assert_eq!(example.align_index, vec![0, 0, 1, 2, 2]);
        assert_eq!(example.labels[0], IGNORE_LABEL);
        assert_eq!(example.labels[4], IGNORE_LABEL);
        assert_eq!(example.labels[1], i64::from(example.input_ids[1]));
        let gi = tokenizer.token_to_id("▁gì").unwrap();
        assert_eq!(example.labels[3], i64::from(gi));
        assert!(example.weights().iter().all(|&w| w == 1.0));
    }

    #[test]
    fn word_count_mismatch_is_skipped() {
        let (mut handler, _) = handler(&TrainingConfig::default());
        let rows = vec![pair(0, "ko bít", "không biết"), pair(1, "hok", "không có")];
        let examples = handler.build_examples(rows, Split::Dev).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].id, 0);
    }

    #[test]
    fn unlabeled_rows_carry_no_labels() {
        let (mut handler, _) = handler(&TrainingConfig::default());
        let row = RawRow {
            id: 3,
            input: "đẹp wá".into(),
            output: None,
        };
        let example = handler.build_unlabeled(&row).unwrap();
        assert_eq!(example.len(), 4);
        assert!(example.labels.iter().all(|&l| l == IGNORE_LABEL));
        assert!(example.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn accent_augmentation_only_touches_train_inputs() {
        let config = TrainingConfig::default().with_rm_accent_ratio(1.0);
        let (mut handler, tokenizer) = handler(&config);
        let row = pair(0, "khó chệu", "khó chịu");

        let train = handler.build_labeled(&row, true).unwrap().unwrap();
        let tokens = tokenizer.convert_ids_to_tokens(&train.input_ids);
        assert_eq!(tokens[1..3], ["▁kho".to_string(), "▁cheu".to_string()]);
        assert_eq!(train.is_nsw, vec![0, 1, 1, 0]);

        let dev = handler.build_labeled(&row, false).unwrap().unwrap();
        let tokens = tokenizer.convert_ids_to_tokens(&dev.input_ids);
        assert_eq!(tokens[1], "▁khó");
    }

    #[test]
    fn jsonl_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"id": 0, "input": "ko bít", "output": "không biết"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": 1, "input": "đẹp wá"}}"#).unwrap();
        drop(file);

        let rows = load_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].output, None);

        let (mut handler, _) = handler(&TrainingConfig::default());
        let train = handler.load_dataset(&path, Split::Train).unwrap();
        assert_eq!(train.len(), 1);
        let unlabeled = handler.load_dataset(&path, Split::Unlabeled).unwrap();
        assert_eq!(unlabeled.len(), 2);
    }

    #[test]
    fn preprocessor_splits_glued_punctuation() {
        let (handler, tokenizer) = handler(&TrainingConfig::default());
        let mut handler = handler.with_preprocessor(BasicNormalizer::new().unwrap());
        let example = handler
            .build_labeled(&pair(3, "Đẹp wá!", "đẹp quá !"), false)
            .unwrap()
            .unwrap();

        let tokens = tokenizer.convert_ids_to_tokens(&example.input_ids);
        assert_eq!(tokens, ["<s>", "▁đẹp", "▁wá", "▁!", "</s>"]);
        assert_eq!(example.is_nsw, vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn malformed_line_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(load_jsonl(&path), Err(VisolexError::Configuration(_))));
    }
}
