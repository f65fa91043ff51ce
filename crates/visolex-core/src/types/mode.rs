use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VisolexError;

/// How the normalizer is trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Labeled data only.
    Supervised,
    /// Student relabels the unlabeled pool itself.
    SemiSupervised,
    /// A separate teacher relabels the unlabeled pool for the student.
    WeaklySupervised,
}

impl TrainingMode {
    /// Whether the mode consumes an unlabeled pool.
    #[must_use]
    pub fn needs_unlabeled(self) -> bool {
        !matches!(self, Self::Supervised)
    }

    /// Whether the mode trains a teacher model.
    #[must_use]
    pub fn has_teacher(self) -> bool {
        matches!(self, Self::WeaklySupervised)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supervised => "supervised",
            Self::SemiSupervised => "semi_supervised",
            Self::WeaklySupervised => "weakly_supervised",
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingMode {
    type Err = VisolexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supervised" => Ok(Self::Supervised),
            "semi_supervised" => Ok(Self::SemiSupervised),
            "weakly_supervised" => Ok(Self::WeaklySupervised),
            other => Err(VisolexError::Configuration(format!(
                "unknown training mode {other:?}"
            ))),
        }
    }
}
