//! # ViSoLex Trainer
//!
//! Training workflows for ViSoLex normalizers: dataset loading, the
//! pseudo-labeled pool, token-level evaluation and the weakly/semi-supervised
//! self-training loop that selects the best student checkpoint.

pub mod baseline;
pub mod config;
pub mod data;
pub mod evaluate;
pub mod pseudo;
pub mod results;
pub mod self_training;

pub use baseline::BaselineModel;
pub use config::{Metric, TrainingConfig};
pub use data::{DataHandler, RawRow, Split};
pub use evaluate::Evaluator;
pub use pseudo::{Column, Partition, PseudoDataset};
pub use results::TrainingResult;
pub use self_training::{CancellationFlag, SelfTrainer, TeacherFactory, TrainingData};
