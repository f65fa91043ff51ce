//! # Checkpoint Store
//!
//! Checkpoints live under
//! `{root}/{family}/{mode}_{ratio}/{name}`, e.g.
//! `model_checkpoints/visobert/weakly_supervised_0.0/student_best`.
//!
//! A save either leaves a complete new checkpoint in place or leaves the
//! previous one untouched: the model writes into a staging directory that is
//! renamed over the target only after the write succeeded. A save killed
//! between its two renames leaves the old checkpoint in a hidden
//! `.{name}.previous-{pid}` sibling, which the next load moves back.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, VisolexError};
use crate::model::SequenceLabelingModel;
use crate::types::TrainingMode;

/// Files the reference checkpoints ship with.
pub const DEFAULT_CHECKPOINT_FILES: &[&str] = &["config.json", "model.safetensors"];

/// The four checkpoint slots of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointName {
    StudentLast,
    StudentBest,
    TeacherLast,
    TeacherBest,
}

impl CheckpointName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StudentLast => "student_last",
            Self::StudentBest => "student_best",
            Self::TeacherLast => "teacher_last",
            Self::TeacherBest => "teacher_best",
        }
    }
}

impl fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the training run a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub family: String,
    pub mode: TrainingMode,
    pub rm_accent_ratio: f32,
}

impl CheckpointKey {
    pub fn new(family: impl Into<String>, mode: TrainingMode, rm_accent_ratio: f32) -> Self {
        Self {
            family: family.into(),
            mode,
            rm_accent_ratio,
        }
    }

    /// `{mode}_{ratio}`, with the ratio always carrying a decimal point.
    #[must_use]
    pub fn run_name(&self) -> String {
        format!("{}_{}", self.mode, format_ratio(self.rm_accent_ratio))
    }

    /// Path of the checkpoint relative to the store root.
    #[must_use]
    pub fn relative_dir(&self, name: CheckpointName) -> PathBuf {
        PathBuf::from(&self.family)
            .join(self.run_name())
            .join(name.as_str())
    }
}

/// Formats a ratio the way the published checkpoint directories are named (`0.0`, `0.25`).
#[must_use]
pub fn format_ratio(ratio: f32) -> String {
    if ratio.fract() == 0.0 {
        format!("{ratio:.1}")
    } else {
        format!("{ratio}")
    }
}

/// Somewhere a missing checkpoint can be fetched from.
pub trait CheckpointSource: Send + Sync {
    /// Materializes the checkpoint into `dest`, which does not exist yet.
    fn fetch(&self, key: &CheckpointKey, name: CheckpointName, dest: &Path) -> Result<()>;
}

/// Downloads published checkpoints file by file over HTTP.
///
/// Every file is fetched loose from
/// `{base_url}/{family}/{mode}_{ratio}/{name}/{file}`, mirroring the local
/// store layout. Zipped release assets named
/// `{family}_{mode}_{ratio}_{version}.zip` are not understood, so `base_url`
/// must point at an unpacked mirror of the checkpoint tree rather than at a
/// release download page.
pub struct HttpCheckpointSource {
    base_url: String,
    files: Vec<String>,
    client: reqwest::blocking::Client,
}

impl HttpCheckpointSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            files: DEFAULT_CHECKPOINT_FILES
                .iter()
                .map(|f| f.to_string())
                .collect(),
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Replaces the list of files downloaded per checkpoint.
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    fn url(&self, key: &CheckpointKey, name: CheckpointName, file: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            key.family,
            key.run_name(),
            name,
            file
        )
    }
}

impl CheckpointSource for HttpCheckpointSource {
    fn fetch(&self, key: &CheckpointKey, name: CheckpointName, dest: &Path) -> Result<()> {
        let staging = staging_path(dest, "download")?;
        fs::create_dir_all(&staging)?;

        let result = self.files.iter().try_for_each(|file| {
            let url = self.url(key, name, file);
            info!(%url, "downloading checkpoint file");
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| VisolexError::Fetch(format!("{url}: {e}")))?;
            if !response.status().is_success() {
                return Err(VisolexError::Fetch(format!(
                    "{url}: HTTP {}",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .map_err(|e| VisolexError::Fetch(format!("{url}: {e}")))?;
            fs::write(staging.join(file), &bytes)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                fs::rename(&staging, dest)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }
}

/// Saves and loads model checkpoints under a root directory.
#[derive(Clone)]
pub struct CheckpointStore {
    root: PathBuf,
    source: Option<Arc<dyn CheckpointSource>>,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source: None,
        }
    }

    /// Sets the fallback used when a checkpoint is missing locally.
    pub fn with_source(mut self, source: Arc<dyn CheckpointSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute directory of a checkpoint.
    #[must_use]
    pub fn dir(&self, key: &CheckpointKey, name: CheckpointName) -> PathBuf {
        self.root.join(key.relative_dir(name))
    }

    #[must_use]
    pub fn exists(&self, key: &CheckpointKey, name: CheckpointName) -> bool {
        self.dir(key, name).is_dir()
    }

    /// Writes `model` under `name`, replacing any previous checkpoint atomically.
    pub fn save<M>(&self, model: &M, key: &CheckpointKey, name: CheckpointName) -> Result<PathBuf>
    where
        M: SequenceLabelingModel + ?Sized,
    {
        let target = self.dir(key, name);
        info!(checkpoint = %name, path = %target.display(), "saving checkpoint");

        let staging = staging_path(&target, "staging")?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        if let Err(e) = model.save(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let previous = staging_path(&target, "previous")?;
        if target.exists() {
            if previous.exists() {
                fs::remove_dir_all(&previous)?;
            }
            fs::rename(&target, &previous)?;
        }
        if let Err(e) = fs::rename(&staging, &target) {
            if previous.exists() {
                let _ = fs::rename(&previous, &target);
            }
            return Err(e.into());
        }
        for (_, stranded) in stranded_previous(&target)? {
            fs::remove_dir_all(&stranded)?;
        }
        Ok(target)
    }

    /// Restores `model` from `name`, fetching the checkpoint first if it is missing.
    pub fn load<M>(
        &self,
        model: &mut M,
        key: &CheckpointKey,
        name: CheckpointName,
    ) -> Result<PathBuf>
    where
        M: SequenceLabelingModel + ?Sized,
    {
        let dir = self.dir(key, name);
        if !dir.is_dir() && !recover_previous(&dir)? {
            let Some(ref source) = self.source else {
                return Err(VisolexError::ModelUnavailable {
                    path: dir,
                    reason: "checkpoint not found and no remote source configured".into(),
                });
            };
            warn!(path = %dir.display(), "checkpoint missing locally, fetching");
            if let Some(parent) = dir.parent() {
                fs::create_dir_all(parent)?;
            }
            source
                .fetch(key, name, &dir)
                .map_err(|e| VisolexError::ModelUnavailable {
                    path: dir.clone(),
                    reason: e.to_string(),
                })?;
        }
        debug!(path = %dir.display(), "loading checkpoint");
        model.load(&dir)?;
        Ok(dir)
    }
}

impl fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("root", &self.root)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

fn staging_path(target: &Path, suffix: &str) -> Result<PathBuf> {
    let parent = target.parent().ok_or_else(|| {
        VisolexError::Configuration(format!("checkpoint path {} has no parent", target.display()))
    })?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parent.join(format!(".{name}.{suffix}-{}", std::process::id())))
}

/// Hidden `previous` copies of `target` left by saves of any process.
fn stranded_previous(target: &Path) -> Result<Vec<(SystemTime, PathBuf)>> {
    let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
        return Ok(Vec::new());
    };
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!(".{}.previous-", name.to_string_lossy());
    let mut stranded = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) && entry.file_type()?.is_dir() {
            stranded.push((entry.metadata()?.modified()?, entry.path()));
        }
    }
    Ok(stranded)
}

/// Moves the newest stranded `previous` copy back to `target`.
fn recover_previous(target: &Path) -> Result<bool> {
    let newest = stranded_previous(target)?
        .into_iter()
        .max_by_key(|(modified, _)| *modified);
    let Some((_, previous)) = newest else {
        return Ok(false);
    };
    warn!(
        from = %previous.display(),
        to = %target.display(),
        "restoring checkpoint left behind by an interrupted save"
    );
    fs::rename(&previous, target)?;
    Ok(true)
}
