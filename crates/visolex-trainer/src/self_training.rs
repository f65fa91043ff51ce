//! # Self-Training Orchestrator
//!
//! Drives a training run through its stages:
//!
//! ```text
//! supervised:            Init -> SupervisedWarmup -> Done
//! semi/weakly supervised: Init -> SupervisedWarmup -> Iteration(1..=num_iter) -> Done
//! ```
//!
//! Each iteration downsamples the pseudo-labeled pool, refreshes its labels
//! (from the teacher in weakly supervised mode, from the student itself in
//! semi-supervised mode), retrains the student on the pseudo-labels and then
//! fine-tunes it on clean data. `student_best` is overwritten only when dev
//! performance strictly improves on every earlier record. Cancellation is
//! checked at the top of each iteration; a cancelled run still goes through
//! `Done` with the iterations it finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};
use visolex_core::{
    CheckpointKey, CheckpointName, CheckpointStore, EvalRecord, Example, FitData, FitMode,
    Prediction, Result, SENTINEL_INVALID, SequenceLabelingModel, SubwordTokenizer, TrainingMode,
    VisolexError,
};

use crate::config::TrainingConfig;
use crate::evaluate::Evaluator;
use crate::pseudo::{Column, Partition, PseudoDataset};
use crate::results::{self, TrainingResult};

const PREDICTIONS_FILE: &str = "student_best_predictions.jsonl";

/// Shared flag that stops a run before its next iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The splits a run trains and evaluates on.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    pub train: Vec<Example>,
    pub dev: Vec<Example>,
    pub test: Vec<Example>,
    pub unlabeled: Option<Vec<Example>>,
}

/// Builds the teacher once the student's hidden width is known.
pub type TeacherFactory<T> = Box<dyn FnOnce(usize) -> Result<T> + Send>;

#[derive(Debug, Default)]
struct History {
    student_train: Vec<EvalRecord>,
    student_dev: Vec<EvalRecord>,
    student_test: Vec<EvalRecord>,
    teacher_train: Vec<EvalRecord>,
    teacher_dev: Vec<EvalRecord>,
    teacher_test: Vec<EvalRecord>,
    /// Student test predictions per epoch, kept only when they will be written.
    student_test_predictions: Vec<Vec<Prediction>>,
}

impl History {
    fn best_dev(&self) -> f64 {
        self.student_dev
            .iter()
            .map(|r| r.perf)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Runs supervised warm-up and self-training rounds for one student.
pub struct SelfTrainer<S, T = S> {
    config: TrainingConfig,
    key: CheckpointKey,
    store: CheckpointStore,
    evaluator: Evaluator,
    student: S,
    teacher: Option<T>,
    teacher_factory: Option<TeacherFactory<T>>,
    data: TrainingData,
    pseudo: Option<PseudoDataset>,
    tokenizer: Option<Arc<dyn SubwordTokenizer>>,
    cancel: CancellationFlag,
    history: History,
}

impl<S, T> SelfTrainer<S, T>
where
    S: SequenceLabelingModel,
    T: SequenceLabelingModel,
{
    /// Validates the run and builds the pseudo-labeled pool.
    ///
    /// # Errors
    ///
    /// Returns [`VisolexError::Configuration`] when the config is invalid or
    /// the mode needs an unlabeled pool and none was given.
    pub fn new(config: TrainingConfig, student: S, mut data: TrainingData) -> Result<Self> {
        config.validate()?;
        let mode = config.training_mode;

        let pseudo = if mode.needs_unlabeled() {
            let pool = data.unlabeled.take().ok_or_else(|| {
                VisolexError::Configuration(format!(
                    "an unlabeled dataset must be provided for {mode} training"
                ))
            })?;
            info!(rows = pool.len(), "creating pseudo-dataset");
            let mut pseudo = PseudoDataset::new(pool, config.seed);
            pseudo.downsample(config.sample_size);
            Some(pseudo)
        } else {
            None
        };

        Ok(Self {
            key: config.checkpoint_key(),
            store: CheckpointStore::new(&config.ckpt_dir),
            evaluator: Evaluator::new(config.metric),
            config,
            student,
            teacher: None,
            teacher_factory: None,
            data,
            pseudo,
            tokenizer: None,
            cancel: CancellationFlag::new(),
            history: History::default(),
        })
    }

    /// Sets how the teacher is built in weakly supervised mode.
    pub fn with_teacher_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(usize) -> Result<T> + Send + 'static,
    {
        self.teacher_factory = Some(Box::new(factory));
        self
    }

    /// Replaces the checkpoint store (e.g. to add a remote source).
    pub fn with_store(mut self, store: CheckpointStore) -> Self {
        self.store = store;
        self
    }

    /// Decodes written predictions back to text.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn SubwordTokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// A handle that cancels this run from another thread.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn student(&self) -> &S {
        &self.student
    }

    pub fn teacher(&self) -> Option<&T> {
        self.teacher.as_ref()
    }

    pub fn pseudo_dataset(&self) -> Option<&PseudoDataset> {
        self.pseudo.as_ref()
    }

    /// Runs every stage of the configured mode and writes the final artifacts.
    pub fn train(&mut self) -> Result<TrainingResult> {
        self.supervised_warmup()?;

        let mut cancelled = false;
        if self.config.training_mode.needs_unlabeled() {
            if self.config.training_mode.has_teacher() {
                self.build_teacher()?;
            }
            for iteration in 1..=self.config.num_iter {
                if self.cancel.is_cancelled() {
                    warn!(iteration, "training cancelled");
                    cancelled = true;
                    break;
                }
                info!("*** Starting loop {}/{} ***", iteration, self.config.num_iter);
                self.run_iteration(iteration)?;
            }
        }

        self.finish(cancelled)
    }

    fn keep_predictions(&self) -> bool {
        self.config.write_predictions
    }

    fn supervised_warmup(&mut self) -> Result<()> {
        info!(student = %self.config.student_name, "*** Training student on labeled data ***");
        let record = self.student.fit(
            FitData::new(&self.data.train, &self.data.dev),
            FitMode::Train,
        )?;
        self.history.student_train.push(self.evaluator.with_perf(record));

        if self.config.training_mode == TrainingMode::Supervised {
            self.store
                .save(&self.student, &self.key, CheckpointName::StudentBest)?;
        }

        self.evaluate_student("student dev", "student test")
    }

    fn build_teacher(&mut self) -> Result<()> {
        let factory = self.teacher_factory.take().ok_or_else(|| {
            VisolexError::Configuration(
                "weakly supervised training needs a teacher factory".into(),
            )
        })?;
        let hidden_size = self.student.hidden_size();
        info!(hidden_size, "building teacher");
        self.teacher = Some(factory(hidden_size)?);

        self.history.teacher_train.push(EvalRecord::zero());
        self.history.teacher_dev.push(EvalRecord::zero());
        self.history.teacher_test.push(EvalRecord::zero());
        Ok(())
    }

    fn run_iteration(&mut self, iteration: usize) -> Result<()> {
        let pseudo = self
            .pseudo
            .as_mut()
            .ok_or_else(|| VisolexError::Training("pseudo-dataset was not built".into()))?;
        pseudo.downsample(self.config.sample_size);

        let partition = match self.teacher.as_mut() {
            Some(teacher) => {
                let record = teacher.fit(
                    FitData::new(&self.data.train, &self.data.dev)
                        .with_unlabeled(pseudo.partition(Partition::Teacher)),
                    FitMode::Train,
                )?;
                self.history.teacher_train.push(self.evaluator.with_perf(record));

                let predictions = teacher.predict(pseudo.partition(Partition::Teacher))?;

                let (dev, _) = self.evaluator.evaluate(
                    &*teacher,
                    &self.data.dev,
                    &format!("teacher dev iter{iteration}"),
                )?;
                let (test, _) = self.evaluator.evaluate(
                    &*teacher,
                    &self.data.test,
                    &format!("teacher test iter{iteration}"),
                )?;
                self.history.teacher_dev.push(dev);
                self.history.teacher_test.push(test);

                info!("update unlabeled data with teacher's predictions");
                pseudo.write_predictions(Partition::Teacher, predictions);
                pseudo.drop(Column::Labels, SENTINEL_INVALID, Partition::Teacher);
                Partition::Teacher
            }
            None => {
                let predictions = self.student.predict(pseudo.partition(Partition::Student))?;
                info!("update unlabeled data with student's predictions");
                pseudo.write_predictions(Partition::Student, predictions);
                pseudo.drop(Column::Labels, SENTINEL_INVALID, Partition::Student);
                Partition::Student
            }
        };

        info!(rows = pseudo.len(partition), "re-training student on pseudo-labeled instances");
        self.student.fit(
            FitData::new(pseudo.partition(partition), &self.data.dev),
            FitMode::TrainPseudo,
        )?;

        info!("fine-tuning the student on clean labeled data");
        let record = self.student.fit(
            FitData::new(&self.data.train, &self.data.dev),
            FitMode::Finetune,
        )?;
        self.history.student_train.push(self.evaluator.with_perf(record));

        let prev_max = self.history.best_dev();
        self.evaluate_student(
            &format!("student dev iter{iteration}"),
            &format!("student test iter{iteration}"),
        )?;
        let dev_perf = self.history.student_dev.last().map_or(0.0, |r| r.perf);
        info!(iteration, dev = dev_perf, "student dev performance");

        if dev_perf > prev_max {
            info!("improved dev performance from {:.2} to {:.2}", prev_max, dev_perf);
            self.store
                .save(&self.student, &self.key, CheckpointName::StudentBest)?;
            if let Some(teacher) = self.teacher.as_ref() {
                self.store
                    .save(teacher, &self.key, CheckpointName::TeacherBest)?;
            }
        }
        Ok(())
    }

    fn evaluate_student(&mut self, dev_comment: &str, test_comment: &str) -> Result<()> {
        let (dev, _) = self
            .evaluator
            .evaluate(&self.student, &self.data.dev, dev_comment)?;
        let (test, predictions) = self
            .evaluator
            .evaluate(&self.student, &self.data.test, test_comment)?;
        self.history.student_dev.push(dev);
        self.history.student_test.push(test);
        if self.keep_predictions() {
            self.history.student_test_predictions.push(predictions);
        }
        Ok(())
    }

    fn finish(&mut self, cancelled: bool) -> Result<TrainingResult> {
        let history = &self.history;
        let metric = self.evaluator.metric();
        let has_teacher = self.teacher.is_some();

        if has_teacher {
            info!(
                "TEACHER PERFORMANCES:\n{}",
                results::performance_table(&history.teacher_dev, &history.teacher_test)
            );
        }
        info!(
            "STUDENT PERFORMANCES:\n{}",
            results::performance_table(&history.student_dev, &history.student_test)
        );

        let dev_perfs: Vec<f64> = history.student_dev.iter().map(|r| r.perf).collect();
        let test_perfs: Vec<f64> = history.student_test.iter().map(|r| r.perf).collect();
        let best = results::best_epoch(&dev_perfs);
        let best_test = results::best_epoch(&test_perfs);
        let record_at =
            |records: &[EvalRecord], i: usize| records.get(i).copied().unwrap_or_default();

        info!(
            "BEST DEV {} = {:.3} for epoch {}",
            metric,
            record_at(&history.student_dev, best).perf,
            best
        );
        info!(
            "FINAL TEST {} = {:.3} for epoch {} (max={:.2} for epoch {})",
            metric,
            record_at(&history.student_test, best).perf,
            best,
            record_at(&history.student_test, best_test).perf,
            best_test
        );

        let teacher_lists = has_teacher.then(|| {
            (
                history.teacher_train.clone(),
                history.teacher_dev.clone(),
                history.teacher_test.clone(),
            )
        });
        let result = TrainingResult {
            student_train_iter: history.student_train.clone(),
            student_dev_iter: history.student_dev.clone(),
            student_test_iter: history.student_test.clone(),
            student_dev: record_at(&history.student_dev, best),
            student_test: record_at(&history.student_test, best),
            teacher_dev: has_teacher.then(|| record_at(&history.teacher_dev, best)),
            teacher_test: has_teacher.then(|| record_at(&history.teacher_test, best)),
            teacher_train_iter: teacher_lists.as_ref().map(|l| l.0.clone()),
            teacher_dev_iter: teacher_lists.as_ref().map(|l| l.1.clone()),
            teacher_test_iter: teacher_lists.map(|l| l.2),
            best_epoch: best,
            cancelled,
        };

        if self.config.write_predictions {
            if let Some(predictions) = history.student_test_predictions.get(best) {
                let path = self.config.results_dir.join(PREDICTIONS_FILE);
                info!(path = %path.display(), "writing best student predictions");
                results::write_predictions(&path, predictions, self.tokenizer.as_deref())?;
            }
        }

        self.store
            .save(&self.student, &self.key, CheckpointName::StudentLast)?;
        if let Some(teacher) = self.teacher.as_ref() {
            self.store
                .save(teacher, &self.key, CheckpointName::TeacherLast)?;
        }

        let path = self.config.results_file();
        result.save(&path)?;
        info!(path = %path.display(), "saved results");
        Ok(result)
    }
}
