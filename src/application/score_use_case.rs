// ============================================================
// Layer 2 — ScoreUseCase
// ============================================================
// Loads the latest checkpoint and a parallel corpus, scores it
// and writes the result to stdout:
//
//   corpus_average = false → one perplexity per line
//   corpus_average = true  → a single value
//
// Scoring only reads the checkpoint directory, so it can run
// while a training run is writing to it.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::loader::ParallelTextLoader;
use crate::domain::error::PipelineError;
use crate::ml::runtime::BurnRuntime;
use crate::ml::scorer::{ScoreReport, Scorer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub source_path:    PathBuf,
    pub target_path:    PathBuf,
    pub load_from:      PathBuf,
    pub batch_size:     usize,
    pub corpus_average: bool,
    pub normalize:      bool,
}

impl ScoreConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch size must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub struct ScoreUseCase {
    config: ScoreConfig,
}

impl ScoreUseCase {
    pub fn new(config: ScoreConfig) -> Self {
        Self { config }
    }

    /// Score the corpus and return the report (not yet printed).
    pub fn execute(&self) -> Result<ScoreReport> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Restore model + vocabularies ──────────────────────────────
        let scorer = Scorer::<BurnRuntime>::from_checkpoint(&cfg.load_from)
            .with_context(|| format!("Cannot load model from '{}'", cfg.load_from.display()))?;

        // ── Step 2: Load the parallel corpus ──────────────────────────────────
        let corpus = ParallelTextLoader::new(&cfg.source_path, &cfg.target_path).load()?;
        if corpus.is_empty() {
            return Err(PipelineError::corpus(&cfg.source_path, "nothing to score").into());
        }

        // ── Step 3: Score ─────────────────────────────────────────────────────
        let report = scorer
            .report(&corpus, cfg.batch_size, cfg.corpus_average, cfg.normalize)
            .context("Scoring failed")?;
        tracing::info!("Scored {} sentence pair(s)", corpus.len());
        Ok(report)
    }

    /// Score and print to stdout.
    pub fn execute_to_stdout(&self) -> Result<()> {
        let report = self.execute()?;
        report
            .write_to(io::stdout().lock())
            .map_err(PipelineError::OutputWrite)?;
        Ok(())
    }
}
