// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Persists model parameters together with the vocabularies
// used to train them, and resolves the authoritative "latest"
// checkpoint for resuming, scoring and translation.
//
// Directory layout:
//   checkpoints/
//     train_config.json      ← hyperparameters of the run
//     metrics.csv            ← one row per epoch
//     latest.json            ← {"epoch": 2, "name": "epoch-0002"}
//     epoch-0001/
//       manifest.json        ← epoch, vocab sizes, model hyperparameters
//       model.mpk            ← written by the ModelRuntime
//       source_vocab.json
//       target_vocab.json
//     epoch-0002/ ...
//
// Publish protocol (a reader never sees a partial checkpoint):
//   1. write everything into epoch-NNNN.tmp/
//   2. rename epoch-NNNN.tmp/ → epoch-NNNN/
//   3. write latest.json.tmp, rename over latest.json
// A crash before step 3 leaves the previous latest untouched.
//
// Only one training run may write to a directory at a time.
// CheckpointStore::lock() takes an OS advisory lock on
// .train.lock; the kernel releases it when the process exits,
// so a killed run never blocks the next one. The file itself
// stays on disk and only records the holder's PID.
// Scorers and translators only read.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;
use crate::domain::traits::{ModelRuntime, Persistable};
use crate::domain::training::ModelHyperparameters;
use crate::domain::vocabulary::Vocabulary;

const LATEST_FILE: &str = "latest.json";
const MANIFEST_FILE: &str = "manifest.json";
const SOURCE_VOCAB_FILE: &str = "source_vocab.json";
const TARGET_VOCAB_FILE: &str = "target_vocab.json";
const CONFIG_FILE: &str = "train_config.json";
const LOCK_FILE: &str = ".train.lock";
const EPOCH_PREFIX: &str = "epoch-";

/// Metadata stored next to the parameters of every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub epoch:             usize,
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    pub hyperparameters:   ModelHyperparameters,
    pub mean_loss:         Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LatestMarker {
    epoch: usize,
    name:  String,
}

/// A checkpoint resolved through the latest marker.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub dir:          PathBuf,
    pub manifest:     CheckpointManifest,
    pub source_vocab: Vocabulary,
    pub target_vocab: Vocabulary,
}

/// Manages saving and loading of checkpoints under one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Take the single-writer lock for a training run.
    pub fn lock(&self) -> Result<CheckpointLock, PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::checkpoint_write(&self.dir, e))?;
        let path = self.dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| PipelineError::checkpoint_write(&path, e))?;
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                PipelineError::CheckpointLocked { path: self.dir.clone() }
            } else {
                PipelineError::checkpoint_write(&path, e)
            }
        })?;

        // Whatever PID a killed run left behind is overwritten
        file.set_len(0)
            .and_then(|_| file.rewind())
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|e| PipelineError::checkpoint_write(&path, e))?;
        tracing::debug!("Locked '{}'", path.display());
        Ok(CheckpointLock { path, file })
    }

    /// Save the training configuration so later runs can inspect it.
    pub fn save_config<T: Serialize>(&self, config: &T) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::checkpoint_write(&self.dir, e))?;
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| PipelineError::checkpoint_write(&self.dir, e))?;
        write_atomic(&self.dir.join(CONFIG_FILE), json.as_bytes())?;
        tracing::debug!("Saved training config to '{}'", self.dir.join(CONFIG_FILE).display());
        Ok(())
    }

    /// Write a new checkpoint and make it the latest one.
    pub fn publish<R: ModelRuntime>(
        &self,
        manifest:     &CheckpointManifest,
        runtime:      &R,
        source_vocab: &Vocabulary,
        target_vocab: &Vocabulary,
    ) -> Result<PathBuf, PipelineError> {
        let name = checkpoint_name(manifest.epoch);
        let staging = self.dir.join(format!("{name}.tmp"));
        let final_dir = self.dir.join(&name);

        // Leftovers from an interrupted run are never authoritative
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| PipelineError::checkpoint_write(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| PipelineError::checkpoint_write(&staging, e))?;

        runtime.save(&staging)?;
        source_vocab.save(&staging.join(SOURCE_VOCAB_FILE))?;
        target_vocab.save(&staging.join(TARGET_VOCAB_FILE))?;
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| PipelineError::checkpoint_write(&staging, e))?;
        fs::write(staging.join(MANIFEST_FILE), json)
            .map_err(|e| PipelineError::checkpoint_write(&staging, e))?;

        if final_dir.exists() {
            if self.latest_name().as_deref() == Some(name.as_str()) {
                return Err(PipelineError::checkpoint_write(
                    &final_dir,
                    "refusing to overwrite the latest checkpoint in place",
                ));
            }
            // Renamed but never marked latest: a crash between steps 2 and 3
            fs::remove_dir_all(&final_dir).map_err(|e| PipelineError::checkpoint_write(&final_dir, e))?;
        }
        fs::rename(&staging, &final_dir).map_err(|e| PipelineError::checkpoint_write(&final_dir, e))?;

        let marker = LatestMarker { epoch: manifest.epoch, name };
        let json = serde_json::to_string(&marker)
            .map_err(|e| PipelineError::checkpoint_write(&self.dir, e))?;
        write_atomic(&self.dir.join(LATEST_FILE), json.as_bytes())?;

        tracing::debug!("Published checkpoint '{}'", final_dir.display());
        Ok(final_dir)
    }

    /// Resolve the latest marker and load manifest and vocabularies.
    pub fn latest(&self) -> Result<LoadedCheckpoint, PipelineError> {
        let marker_path = self.dir.join(LATEST_FILE);
        let marker_json = fs::read_to_string(&marker_path).map_err(|e| {
            PipelineError::missing_checkpoint(
                &marker_path,
                format!("{e}. Has a training run published a checkpoint here?"),
            )
        })?;
        let marker: LatestMarker = serde_json::from_str(&marker_json)
            .map_err(|e| PipelineError::missing_checkpoint(&marker_path, e))?;

        let dir = self.dir.join(&marker.name);
        if !dir.is_dir() {
            return Err(PipelineError::missing_checkpoint(&dir, "checkpoint directory is missing"));
        }
        for required in [MANIFEST_FILE, SOURCE_VOCAB_FILE, TARGET_VOCAB_FILE] {
            if !dir.join(required).is_file() {
                return Err(PipelineError::missing_checkpoint(
                    &dir,
                    format!("required file '{required}' is missing"),
                ));
            }
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_json = fs::read_to_string(&manifest_path)
            .map_err(|e| PipelineError::missing_checkpoint(&manifest_path, e))?;
        let manifest: CheckpointManifest = serde_json::from_str(&manifest_json)
            .map_err(|e| PipelineError::missing_checkpoint(&manifest_path, e))?;

        let source_vocab = Vocabulary::load(&dir.join(SOURCE_VOCAB_FILE))?;
        let target_vocab = Vocabulary::load(&dir.join(TARGET_VOCAB_FILE))?;
        if source_vocab.len() != manifest.source_vocab_size
            || target_vocab.len() != manifest.target_vocab_size
        {
            return Err(PipelineError::missing_checkpoint(
                &dir,
                "vocabulary files do not match the manifest",
            ));
        }

        tracing::info!("Resolved latest checkpoint: epoch {} at '{}'", manifest.epoch, dir.display());
        Ok(LoadedCheckpoint { dir, manifest, source_vocab, target_vocab })
    }

    /// Rebuild a runtime from the latest checkpoint.
    pub fn restore<R: ModelRuntime>(&self) -> Result<(R, LoadedCheckpoint), PipelineError> {
        let checkpoint = self.latest()?;
        let mut runtime = R::initialize(
            checkpoint.manifest.source_vocab_size,
            checkpoint.manifest.target_vocab_size,
            &checkpoint.manifest.hyperparameters,
        )?;
        runtime.load(&checkpoint.dir)?;
        Ok((runtime, checkpoint))
    }

    /// Published checkpoints ordered by epoch.
    pub fn published(&self) -> Result<Vec<(usize, PathBuf)>, PipelineError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| PipelineError::missing_checkpoint(&self.dir, e))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::missing_checkpoint(&self.dir, e))?;
            let path = entry.path();
            let epoch = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(EPOCH_PREFIX))
                .and_then(|n| n.parse::<usize>().ok());
            if let (Some(epoch), true) = (epoch, path.is_dir()) {
                found.push((epoch, path));
            }
        }
        found.sort_by_key(|(epoch, _)| *epoch);
        Ok(found)
    }

    /// Remove the oldest checkpoints so at most `keep` remain.
    /// The latest checkpoint is never removed.
    pub fn prune(&self, keep: usize) -> Result<Vec<PathBuf>, PipelineError> {
        let keep = keep.max(1);
        let latest = self.latest_name();
        let published = self.published()?;
        let excess = published.len().saturating_sub(keep);

        let mut removed = Vec::new();
        for (_, path) in published.into_iter().take(excess) {
            let is_latest = path.file_name().and_then(|n| n.to_str()) == latest.as_deref();
            if is_latest {
                continue;
            }
            fs::remove_dir_all(&path).map_err(|e| PipelineError::checkpoint_write(&path, e))?;
            tracing::debug!("Pruned checkpoint '{}'", path.display());
            removed.push(path);
        }
        Ok(removed)
    }

    /// Whether a latest marker exists (the checkpoint may still be incomplete).
    pub fn has_latest(&self) -> bool {
        self.dir.join(LATEST_FILE).is_file()
    }

    fn latest_name(&self) -> Option<String> {
        let json = fs::read_to_string(self.dir.join(LATEST_FILE)).ok()?;
        serde_json::from_str::<LatestMarker>(&json).ok().map(|m| m.name)
    }
}

/// Held for the duration of a training run; unlocks on drop.
#[derive(Debug)]
pub struct CheckpointLock {
    path: PathBuf,
    file: File,
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        // Closing the handle also releases the lock
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Cannot unlock '{}': {e}", self.path.display());
        }
    }
}

fn checkpoint_name(epoch: usize) -> String {
    format!("{EPOCH_PREFIX}{epoch:04}")
}

/// Write to `<file>.tmp` and rename over the destination.
fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), PipelineError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("checkpoint");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp_path, payload).map_err(|e| PipelineError::checkpoint_write(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| PipelineError::checkpoint_write(path, e))?;
    Ok(())
}
