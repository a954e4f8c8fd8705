// ============================================================
// Layer 3 — Training State Types
// ============================================================
// Transient state owned by the Trainer for one run, plus the
// small records it reports through the TrainingEvents sink.
// None of this is persisted except via log output; checkpoints
// capture only parameters, vocabularies and hyperparameters.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

/// Model hyperparameters carried into every checkpoint manifest
/// so a loader can rebuild the same architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHyperparameters {
    pub embedding_dim: usize,
    pub max_positions: usize,
    pub learning_rate: f64,
    pub seed:          u64,
}

impl Default for ModelHyperparameters {
    fn default() -> Self {
        Self {
            embedding_dim: 64,
            max_positions: 256,
            learning_rate: 1e-3,
            seed:          42,
        }
    }
}

/// Trainer lifecycle:
///
///   Initializing → (RunningEpoch → Checkpointing → [Sampling])* → Completed
///
/// Failed is reachable from every state and is terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainerState {
    Initializing,
    RunningEpoch { epoch: usize },
    Checkpointing { epoch: usize },
    Sampling { epoch: usize },
    Completed,
    Failed { reason: String },
}

impl TrainerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::RunningEpoch { epoch } => write!(f, "running epoch {epoch}"),
            Self::Checkpointing { epoch } => write!(f, "checkpointing epoch {epoch}"),
            Self::Sampling { epoch } => write!(f, "sampling after epoch {epoch}"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub epoch:        usize,
    /// 1-based batch number within the epoch
    pub batch:        usize,
    pub loss:         f64,
    pub running_loss: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch:        usize,
    pub total_epochs: usize,
    pub mean_loss:    f64,
    pub batches:      usize,
    pub elapsed_secs: f64,
}

/// One decoded sentence logged for qualitative monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTranslation {
    pub source:     String,
    pub reference:  String,
    pub hypothesis: String,
}

/// Outcome of a completed training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    pub final_loss:       Option<f64>,
    pub checkpoints:      Vec<PathBuf>,
}

impl From<&PipelineError> for TrainerState {
    fn from(err: &PipelineError) -> Self {
        Self::Failed { reason: err.to_string() }
    }
}
