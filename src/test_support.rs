// Shared helpers for unit tests: scratch directories and a
// scripted ModelRuntime that needs no numeric backend.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::batch::Minibatch;
use crate::domain::error::PipelineError;
use crate::domain::traits::ModelRuntime;
use crate::domain::training::ModelHyperparameters;
use crate::domain::vocabulary::EOS_ID;

/// Labelled `tempfile::TempDir`, removed on drop.
pub struct TempDir {
    inner: tempfile::TempDir,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let inner = tempfile::Builder::new()
            .prefix(&format!("nmt_pipeline_{label}_"))
            .tempdir()
            .expect("create temp dir");
        Self { inner }
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}

/// Deterministic stand-in for a real model.
///
/// - train_step returns 1 / steps and can be told to fail
/// - evaluate_step returns ln(steps + 1) + 0.01 * target length
/// - decode echoes the source ids (mod target vocab size)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedRuntime {
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    pub steps:             usize,
    #[serde(skip)]
    pub fail_at_step:      Option<usize>,
    #[serde(skip)]
    pub fail_decode:       bool,
}

const SNAPSHOT: &str = "scripted.json";

impl ModelRuntime for ScriptedRuntime {
    fn initialize(
        source_vocab_size: usize,
        target_vocab_size: usize,
        _hyperparameters:  &ModelHyperparameters,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            source_vocab_size,
            target_vocab_size,
            steps: 0,
            fail_at_step: None,
            fail_decode: false,
        })
    }

    fn train_step(&mut self, _batch: &Minibatch) -> Result<f64, PipelineError> {
        self.steps += 1;
        if self.fail_at_step == Some(self.steps) {
            return Err(PipelineError::runtime("scripted failure"));
        }
        Ok(1.0 / self.steps as f64)
    }

    fn evaluate_step(&self, batch: &Minibatch) -> Result<Vec<f64>, PipelineError> {
        let target = batch
            .target
            .as_ref()
            .ok_or_else(|| PipelineError::runtime("evaluate_step needs targets"))?;
        Ok(target
            .lengths
            .iter()
            .map(|&len| ((self.steps + 1) as f64).ln() + 0.01 * len as f64)
            .collect())
    }

    fn decode(&self, source: &[usize], max_output_length: usize) -> Result<Vec<usize>, PipelineError> {
        if self.fail_decode {
            return Err(PipelineError::runtime("scripted decode failure"));
        }
        Ok(source
            .iter()
            .take_while(|&&id| id != EOS_ID)
            .map(|&id| id % self.target_vocab_size)
            .take(max_output_length)
            .collect())
    }

    fn save(&self, dir: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string(self).map_err(PipelineError::runtime)?;
        fs::write(dir.join(SNAPSHOT), json).map_err(|e| PipelineError::checkpoint_write(dir, e))
    }

    fn load(&mut self, dir: &Path) -> Result<(), PipelineError> {
        let json = fs::read_to_string(dir.join(SNAPSHOT))
            .map_err(|e| PipelineError::missing_checkpoint(dir, e))?;
        let loaded: ScriptedRuntime = serde_json::from_str(&json).map_err(PipelineError::runtime)?;
        if loaded.source_vocab_size != self.source_vocab_size
            || loaded.target_vocab_size != self.target_vocab_size
        {
            return Err(PipelineError::runtime("vocabulary sizes differ from snapshot"));
        }
        self.steps = loaded.steps;
        Ok(())
    }
}
