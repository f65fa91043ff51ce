//! Run results and prediction dumps.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use visolex_core::{EvalRecord, Prediction, Result, SubwordTokenizer};

/// Everything a finished (or cancelled) run reports.
///
/// `student_dev`/`student_test` (and the teacher counterparts) are the
/// records of the best epoch, the last one reaching the maximum dev `perf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub student_train_iter: Vec<EvalRecord>,
    pub student_dev_iter: Vec<EvalRecord>,
    pub student_test_iter: Vec<EvalRecord>,
    pub student_dev: EvalRecord,
    pub student_test: EvalRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_train_iter: Option<Vec<EvalRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_dev_iter: Option<Vec<EvalRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_test_iter: Option<Vec<EvalRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_dev: Option<EvalRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_test: Option<EvalRecord>,
    pub best_epoch: usize,
    #[serde(default)]
    pub cancelled: bool,
}

impl TrainingResult {
    /// Writes the result as pretty JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Index of the last maximum. Later epochs win ties.
#[must_use]
pub fn best_epoch(perfs: &[f64]) -> usize {
    perfs
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &p)| match best {
            Some((_, q)) if q > p => best,
            _ => Some((i, p)),
        })
        .map_or(0, |(i, _)| i)
}

/// One `{i}:\t{dev}\t{test}` line per epoch.
#[must_use]
pub fn performance_table(dev: &[EvalRecord], test: &[EvalRecord]) -> String {
    dev.iter()
        .zip(test)
        .enumerate()
        .map(|(i, (d, t))| format!("{i}:\t{:.2}\t{:.2}", d.perf, t.perf))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Serialize)]
struct PredictionLine<'a> {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<String>,
    preds: &'a [i64],
}

/// Writes one JSON line per prediction, decoding text when a tokenizer is given.
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    predictions: &[Prediction],
    tokenizer: Option<&dyn SubwordTokenizer>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for prediction in predictions {
        let (input, output) = match tokenizer {
            Some(tokenizer) => {
                let pred_ids: Vec<u32> = prediction
                    .preds
                    .iter()
                    .zip(&prediction.input_ids)
                    .map(|(&p, &input)| u32::try_from(p).unwrap_or(input))
                    .collect();
                (
                    Some(decode(tokenizer, &prediction.input_ids)?),
                    Some(decode(tokenizer, &pred_ids)?),
                )
            }
            None => (None, None),
        };
        let line = PredictionLine {
            id: prediction.id,
            input,
            prediction: output,
            preds: &prediction.preds,
        };
        serde_json::to_writer(&mut writer, &line)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn decode(tokenizer: &dyn SubwordTokenizer, ids: &[u32]) -> Result<String> {
    let pieces = tokenizer.convert_ids_to_tokens(ids);
    let (tokens, _) = visolex_core::tokenizer::strip_special_tokens(tokenizer, &pieces);
    tokenizer.convert_tokens_to_string(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use visolex_core::PieceTokenizer;

    fn record(perf: f64) -> EvalRecord {
        EvalRecord {
            perf,
            ..EvalRecord::zero()
        }
    }

    #[test]
    fn best_epoch_prefers_latest_tie() {
        assert_eq!(best_epoch(&[0.1, 0.5, 0.3, 0.5, 0.2]), 3);
        assert_eq!(best_epoch(&[0.9, 0.5]), 0);
        assert_eq!(best_epoch(&[]), 0);
    }

    #[test]
    fn table_formatting() {
        let table = performance_table(&[record(0.5), record(0.756)], &[record(0.25), record(0.7)]);
        assert_eq!(table, "0:\t0.50\t0.25\n1:\t0.76\t0.70");
    }

    #[test]
    fn result_json_omits_teacher_when_absent() {
        let result = TrainingResult {
            student_train_iter: vec![record(0.1)],
            student_dev_iter: vec![record(0.2)],
            student_test_iter: vec![record(0.3)],
            student_dev: record(0.2),
            student_test: record(0.3),
            teacher_train_iter: None,
            teacher_dev_iter: None,
            teacher_test_iter: None,
            teacher_dev: None,
            teacher_test: None,
            best_epoch: 0,
            cancelled: false,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");
        result.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("student_dev_iter"));
        assert!(!raw.contains("teacher"));
        assert_eq!(TrainingResult::load(&path).unwrap(), result);
    }

    #[test]
    fn prediction_dump_decodes_text() {
        let tokenizer = PieceTokenizer::new();
        let input_ids = tokenizer.encode("ko bít").unwrap();
        let khong = i64::from(tokenizer.insert_piece("▁không"));
        let prediction = Prediction {
            id: 4,
            input_ids: input_ids.clone(),
            is_nsw: vec![0, 1, 0, 0],
            align_index: vec![0, 0, 1, 1],
            preds: vec![0, khong, -1, 2],
            proba: vec![vec![1.0]; 4],
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preds.jsonl");
        write_predictions(&path, &[prediction], Some(&tokenizer)).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(line["id"], 4);
        assert_eq!(line["input"], "ko bít");
        assert_eq!(line["prediction"], "không bít");
    }
}
