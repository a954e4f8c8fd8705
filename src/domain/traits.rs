// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The pipeline programs against these traits rather than
// concrete types:
//
//   ModelRuntime   — the trainable/invokable model. BurnRuntime
//                    (ml::runtime) is the production backend;
//                    any numeric backend can plug in.
//   TrainingEvents — sink for epoch/loss/checkpoint milestones.
//                    TracingEvents and MetricsLogger (infra)
//                    implement it.
//   Persistable    — components stored as files (vocabularies).

use std::path::Path;

use crate::domain::batch::Minibatch;
use crate::domain::error::PipelineError;
use crate::domain::training::{
    BatchProgress, EpochSummary, ModelHyperparameters, SampleTranslation, TrainerState,
};

// ─── ModelRuntime ─────────────────────────────────────────────────────────────
/// Lifecycle contract every model implementation satisfies.
///
/// Any method may fail with `PipelineError::ModelRuntime`; callers
/// treat that as fatal for the current run and never retry.
pub trait ModelRuntime: Sized {
    /// Build a freshly initialised model for the given vocabulary sizes.
    fn initialize(
        source_vocab_size: usize,
        target_vocab_size: usize,
        hyperparameters:   &ModelHyperparameters,
    ) -> Result<Self, PipelineError>;

    /// One gradient update. Returns the mean loss per target token.
    fn train_step(&mut self, batch: &Minibatch) -> Result<f64, PipelineError>;

    /// Mean negative log-likelihood per target token for every row,
    /// padding excluded. No parameter update.
    fn evaluate_step(&self, batch: &Minibatch) -> Result<Vec<f64>, PipelineError>;

    /// Greedy autoregressive generation. Stops at </s> or after
    /// `max_output_length` tokens; the returned ids exclude </s>.
    fn decode(
        &self,
        source:            &[usize],
        max_output_length: usize,
    ) -> Result<Vec<usize>, PipelineError>;

    /// Write a full parameter snapshot into `dir`.
    fn save(&self, dir: &Path) -> Result<(), PipelineError>;

    /// Restore the snapshot written by `save` into this model.
    fn load(&mut self, dir: &Path) -> Result<(), PipelineError>;
}

// ─── TrainingEvents ───────────────────────────────────────────────────────────
/// Receives structured milestones from the Trainer.
/// Every hook defaults to a no-op so sinks implement only what they need.
pub trait TrainingEvents {
    fn state_changed(&mut self, _state: &TrainerState) {}

    fn batch_finished(&mut self, _progress: &BatchProgress) {}

    fn epoch_finished(&mut self, _summary: &EpochSummary) {}

    fn checkpoint_published(&mut self, _epoch: usize, _path: &Path) {}

    fn sample_decoded(&mut self, _epoch: usize, _sample: &SampleTranslation) {}

    fn sample_failed(&mut self, _epoch: usize, _error: &PipelineError) {}
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// Any component whose state can be saved and restored from disk.
pub trait Persistable: Sized {
    fn save(&self, path: &Path) -> Result<(), PipelineError>;

    fn load(path: &Path) -> Result<Self, PipelineError>;
}
