// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Wires the training pipeline together:
//
//   Step 1: Validate the configuration
//   Step 2: Build the event sinks (tracing + metrics CSV)  (Layer 6)
//   Step 3: Initialise the Trainer: lock save_to, load the
//           corpus, build or restore vocabularies + model,
//           save the effective run configuration         (Layer 5)
//   Step 4: Run the epoch loop                             (Layer 5)
//
// The numeric backend is chosen here (BurnRuntime); everything
// below this layer is generic over ModelRuntime.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;
use crate::domain::traits::TrainingEvents;
use crate::domain::training::{ModelHyperparameters, TrainingReport};
use crate::domain::vocabulary::RESERVED_TOKENS;
use crate::infra::metrics::{MetricsLogger, TracingEvents};
use crate::ml::runtime::BurnRuntime;
use crate::ml::trainer::Trainer;

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a training run needs. Serialisable so the run's
// settings are kept as <save_to>/train_config.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub source_path:           PathBuf,
    pub target_path:           PathBuf,
    pub save_to:               PathBuf,
    pub load_from:             Option<PathBuf>,
    /// Total epoch bound; a resumed run continues numbering
    pub epochs:                usize,
    pub batch_size:            usize,
    pub source_vocab_max_size: usize,
    pub target_vocab_max_size: usize,
    pub sample_after_epoch:    bool,
    pub sample_count:          usize,
    pub max_output_length:     usize,
    pub shuffle_seed:          Option<u64>,
    pub keep_checkpoints:      Option<usize>,
    pub log_every:             usize,
    pub embedding_dim:         usize,
    pub max_positions:         usize,
    pub learning_rate:         f64,
    pub seed:                  u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let model = ModelHyperparameters::default();
        Self {
            source_path:           PathBuf::from("data/train.src"),
            target_path:           PathBuf::from("data/train.tgt"),
            save_to:               PathBuf::from("checkpoints"),
            load_from:             None,
            epochs:                10,
            batch_size:            32,
            source_vocab_max_size: 30000,
            target_vocab_max_size: 30000,
            sample_after_epoch:    false,
            sample_count:          3,
            max_output_length:     100,
            shuffle_seed:          None,
            keep_checkpoints:      None,
            log_every:             100,
            embedding_dim:         model.embedding_dim,
            max_positions:         model.max_positions,
            learning_rate:         model.learning_rate,
            seed:                  model.seed,
        }
    }
}

impl TrainConfig {
    pub fn hyperparameters(&self) -> ModelHyperparameters {
        ModelHyperparameters {
            embedding_dim: self.embedding_dim,
            max_positions: self.max_positions,
            learning_rate: self.learning_rate,
            seed:          self.seed,
        }
    }

    /// Copy of this config carrying `model`'s hyperparameters.
    pub fn with_hyperparameters(&self, model: &ModelHyperparameters) -> Self {
        Self {
            embedding_dim: model.embedding_dim,
            max_positions: model.max_positions,
            learning_rate: model.learning_rate,
            seed:          model.seed,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        let reserved = RESERVED_TOKENS.len();

        if self.epochs == 0 {
            return invalid("epochs must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch size must be at least 1".to_string());
        }
        if self.source_vocab_max_size < reserved || self.target_vocab_max_size < reserved {
            return invalid(format!(
                "vocabulary max sizes must be at least {reserved} (the reserved symbols)"
            ));
        }
        if self.embedding_dim == 0 || self.max_positions == 0 {
            return invalid("embedding_dim and max_positions must be at least 1".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!("learning rate must be positive, got {}", self.learning_rate));
        }
        if self.keep_checkpoints == Some(0) {
            return invalid("keep_checkpoints must be at least 1".to_string());
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingReport> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;
        tracing::info!(
            "Training on '{}' / '{}' for {} epoch(s), checkpoints → '{}'",
            cfg.source_path.display(),
            cfg.target_path.display(),
            cfg.epochs,
            cfg.save_to.display()
        );

        // ── Step 2: Event sinks ───────────────────────────────────────────────
        let metrics = MetricsLogger::new(&cfg.save_to)
            .with_context(|| format!("Cannot create metrics log in '{}'", cfg.save_to.display()))?;
        tracing::info!("Epoch metrics → '{}'", metrics.csv_path().display());
        let sinks: Vec<Box<dyn TrainingEvents>> = vec![
            Box::new(TracingEvents::new(cfg.log_every)),
            Box::new(metrics),
        ];

        // ── Step 3: Initialise trainer (Layer 5) ──────────────────────────────
        let mut trainer = Trainer::<BurnRuntime>::initialize(cfg, sinks)
            .context("Cannot initialise training")?;
        tracing::info!(
            "Vocabularies: source={} target={}",
            trainer.source_vocab().len(),
            trainer.target_vocab().len()
        );

        // ── Step 4: Run the epoch loop ────────────────────────────────────────
        let report = trainer.run().context("Training failed")?;

        tracing::info!(
            "Training {}: {} epoch(s), final loss {}",
            trainer.state(),
            report.epochs_completed,
            report
                .final_loss
                .map_or_else(|| "n/a".to_string(), |l| format!("{l:.4}"))
        );
        Ok(report)
    }
}
