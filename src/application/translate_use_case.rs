// ============================================================
// Layer 2 — TranslateUseCase
// ============================================================
// Loads the latest checkpoint and streams translations:
//
//   input:  --input <file>  or stdin
//   output: --output <file> or stdout
//
// Both ends are buffered; the Translator flushes after each
// batch so partial output is visible while a long file runs.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;
use crate::ml::runtime::BurnRuntime;
use crate::ml::translator::{TranslationStats, Translator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateConfig {
    pub load_from:         PathBuf,
    pub input:             Option<PathBuf>,
    pub output:            Option<PathBuf>,
    pub batch_size:        usize,
    pub max_output_length: usize,
}

impl TranslateConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch size must be at least 1".to_string()));
        }
        if self.max_output_length == 0 {
            return Err(PipelineError::InvalidConfig("max output length must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub struct TranslateUseCase {
    config: TranslateConfig,
}

impl TranslateUseCase {
    pub fn new(config: TranslateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TranslationStats> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Restore model + vocabularies ──────────────────────────────
        let translator = Translator::<BurnRuntime>::from_checkpoint(&cfg.load_from, cfg.max_output_length)
            .with_context(|| format!("Cannot load model from '{}'", cfg.load_from.display()))?;

        // ── Step 2: Open input and output ─────────────────────────────────────
        let input: Box<dyn BufRead> = match &cfg.input {
            Some(path) => {
                let file = File::open(path).map_err(|e| PipelineError::corpus(path, e))?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(io::stdin().lock()),
        };
        let output: Box<dyn Write> = match &cfg.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Cannot create output file '{}'", path.display()))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };

        // ── Step 3: Stream ────────────────────────────────────────────────────
        let stats = translator
            .translate_stream(input, output, cfg.batch_size)
            .context("Translation failed")?;
        tracing::info!(
            "Translated {} line(s), {} unknown source token(s)",
            stats.lines,
            stats.unknown_tokens
        );
        Ok(stats)
    }
}
