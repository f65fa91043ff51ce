//! Training run configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use visolex_core::checkpoint::{CheckpointKey, format_ratio};
use visolex_core::{Result, TrainingMode, VisolexError};

/// Metric used to pick the best iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Precision,
    Recall,
    #[default]
    F1Score,
    Accuracy,
}

impl Metric {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1Score => "f1_score",
            Self::Accuracy => "accuracy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = VisolexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "precision" => Ok(Self::Precision),
            "recall" => Ok(Self::Recall),
            "f1_score" | "f1" => Ok(Self::F1Score),
            "accuracy" => Ok(Self::Accuracy),
            other => Err(VisolexError::Configuration(format!("unknown metric '{other}'"))),
        }
    }
}

fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("visolex")
}

/// Every option a training run recognizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Model family of the student, e.g. `visobert`, `phobert`, `bartpho`.
    pub student_name: String,
    pub training_mode: TrainingMode,
    /// Share of accented characters stripped from training inputs. `0.0` disables augmentation.
    pub rm_accent_ratio: f32,
    pub num_iter: usize,
    /// Rows kept from the unlabeled pool at each downsampling.
    pub sample_size: usize,
    pub metric: Metric,
    pub seed: u64,
    /// Width of the student's hidden representation.
    pub hidden_size: usize,
    /// Top probability below which the baseline model abstains.
    pub abstain_below: f32,
    pub lowercase: bool,
    pub ckpt_dir: PathBuf,
    pub log_dir: PathBuf,
    pub results_dir: PathBuf,
    pub write_predictions: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let root = default_root();
        Self {
            student_name: "visobert".to_string(),
            training_mode: TrainingMode::WeaklySupervised,
            rm_accent_ratio: 0.0,
            num_iter: 10,
            sample_size: 8096,
            metric: Metric::F1Score,
            seed: 42,
            hidden_size: 768,
            abstain_below: 0.0,
            lowercase: true,
            ckpt_dir: root.join("model_checkpoints"),
            log_dir: root.join("logs"),
            results_dir: root.join("results"),
            write_predictions: false,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON config; missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            VisolexError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Self {
        self.student_name = name.into();
        self
    }

    pub fn with_training_mode(mut self, mode: TrainingMode) -> Self {
        self.training_mode = mode;
        self
    }

    pub fn with_rm_accent_ratio(mut self, ratio: f32) -> Self {
        self.rm_accent_ratio = ratio;
        self
    }

    pub fn with_num_iter(mut self, num_iter: usize) -> Self {
        self.num_iter = num_iter;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set the abstention threshold of the baseline model.
    pub fn with_abstain_below(mut self, threshold: f32) -> Self {
        self.abstain_below = threshold.clamp(0.0, 1.0);
        self
    }

    /// Put checkpoints, logs and results under one directory.
    pub fn with_output_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.ckpt_dir = root.join("model_checkpoints");
        self.log_dir = root.join("logs");
        self.results_dir = root.join("results");
        self
    }

    pub fn with_write_predictions(mut self, enabled: bool) -> Self {
        self.write_predictions = enabled;
        self
    }

    /// Whether training inputs get accent-stripping augmentation.
    #[must_use]
    pub fn remove_accents(&self) -> bool {
        self.rm_accent_ratio != 0.0
    }

    /// Checkpoint key of this run.
    #[must_use]
    pub fn checkpoint_key(&self) -> CheckpointKey {
        CheckpointKey::new(&self.student_name, self.training_mode, self.rm_accent_ratio)
    }

    /// `{family}_{mode}_{ratio}`, shared by the log and results file names.
    #[must_use]
    pub fn run_suffix(&self) -> String {
        format!(
            "{}_{}_{}",
            self.student_name,
            self.training_mode,
            format_ratio(self.rm_accent_ratio)
        )
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(format!("log_{}.log", self.run_suffix()))
    }

    #[must_use]
    pub fn results_file(&self) -> PathBuf {
        self.results_dir
            .join(format!("results_{}.json", self.run_suffix()))
    }

    /// Rejects out-of-range values before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.student_name.trim().is_empty() {
            return Err(VisolexError::Configuration("student_name is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.rm_accent_ratio) {
            return Err(VisolexError::Configuration(format!(
                "rm_accent_ratio must be in [0, 1], got {}",
                self.rm_accent_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.abstain_below) {
            return Err(VisolexError::Configuration(format!(
                "abstain_below must be in [0, 1], got {}",
                self.abstain_below
            )));
        }
        if self.training_mode.needs_unlabeled() && self.sample_size == 0 {
            return Err(VisolexError::Configuration(
                "sample_size must be positive when training on unlabeled data".into(),
            ));
        }
        if self.hidden_size == 0 {
            return Err(VisolexError::Configuration("hidden_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.metric, Metric::F1Score);
        assert_eq!(config.run_suffix(), "visobert_weakly_supervised_0.0");
        assert!(!config.remove_accents());
    }

    #[test]
    fn builder_and_file_names() {
        let config = TrainingConfig::new()
            .with_student_name("bartpho")
            .with_training_mode(TrainingMode::Supervised)
            .with_rm_accent_ratio(0.5)
            .with_output_root("/tmp/run");
        assert!(config.remove_accents());
        assert_eq!(
            config.results_file(),
            PathBuf::from("/tmp/run/results/results_bartpho_supervised_0.5.json")
        );
        assert_eq!(
            config.log_file(),
            PathBuf::from("/tmp/run/logs/log_bartpho_supervised_0.5.log")
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = TrainingConfig::new().with_rm_accent_ratio(1.5);
        assert!(matches!(config.validate(), Err(VisolexError::Configuration(_))));

        let config = TrainingConfig::new().with_sample_size(0);
        assert!(config.validate().is_err());
        let config = config.with_training_mode(TrainingMode::Supervised);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(
            &path,
            r#"{"student_name": "phobert", "training_mode": "semi_supervised", "metric": "accuracy"}"#,
        )
        .unwrap();
        let config = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(config.student_name, "phobert");
        assert_eq!(config.training_mode, TrainingMode::SemiSupervised);
        assert_eq!(config.metric, Metric::Accuracy);
        assert_eq!(config.num_iter, 10);
    }

    #[test]
    fn metric_parsing() {
        assert_eq!("f1_score".parse::<Metric>().unwrap(), Metric::F1Score);
        assert!("bleu".parse::<Metric>().is_err());
    }
}
