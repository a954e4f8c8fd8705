// ============================================================
// Layer 3 — Pipeline Error Taxonomy
// ============================================================
// Every component below the application layer returns
// Result<T, PipelineError>. The application and CLI layers
// wrap these in anyhow with extra context.
//
// Fatal:       CorpusRead, CheckpointNotFound, ModelRuntime,
//              CheckpointWrite, CheckpointLocked, OutputWrite,
//              InvalidConfig
// Recoverable: VocabularyMismatch (only ever logged; unknown
//              tokens are mapped to <unk> and work continues)

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing, unreadable or malformed corpus input
    #[error("cannot read corpus '{}': {reason}", path.display())]
    CorpusRead { path: PathBuf, reason: String },

    /// Load requested on an absent or incomplete checkpoint
    #[error("no usable checkpoint at '{}': {reason}", path.display())]
    CheckpointNotFound { path: PathBuf, reason: String },

    #[error("{unknown_tokens} of {total_tokens} tokens are outside the vocabulary and were mapped to <unk>")]
    VocabularyMismatch {
        unknown_tokens: usize,
        total_tokens: usize,
    },

    /// Compute failure inside the model runtime
    #[error("model runtime failure: {0}")]
    ModelRuntime(String),

    #[error("cannot write checkpoint '{}': {reason}", path.display())]
    CheckpointWrite { path: PathBuf, reason: String },

    #[error("checkpoint directory '{}' is locked by another training run", path.display())]
    CheckpointLocked { path: PathBuf },

    /// Translations or scores could not be written to the sink
    #[error("cannot write output: {0}")]
    OutputWrite(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    pub fn corpus(path: &Path, reason: impl ToString) -> Self {
        Self::CorpusRead {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_checkpoint(path: &Path, reason: impl ToString) -> Self {
        Self::CheckpointNotFound {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn checkpoint_write(path: &Path, reason: impl ToString) -> Self {
        Self::CheckpointWrite {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn runtime(reason: impl ToString) -> Self {
        Self::ModelRuntime(reason.to_string())
    }
}
