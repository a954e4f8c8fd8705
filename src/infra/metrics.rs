// ============================================================
// Layer 6 — Training Event Sinks
// ============================================================
// Two TrainingEvents implementations:
//
//   TracingEvents — forwards milestones to `tracing`
//                   (running loss every `log_every` batches,
//                   epoch summaries, checkpoints, samples)
//   MetricsLogger — appends one CSV row per epoch to
//                   <save_to>/metrics.csv
//
// Example CSV output:
//   epoch,mean_loss,batches,elapsed_secs
//   1,4.812300,120,3.214000
//   2,3.905100,120,3.187000
//
// The CSV header is written only when the file is new, so a
// resumed run keeps appending to the same log.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::error::PipelineError;
use crate::domain::traits::TrainingEvents;
use crate::domain::training::{BatchProgress, EpochSummary, SampleTranslation, TrainerState};

// ─── TracingEvents ────────────────────────────────────────────────────────────
pub struct TracingEvents {
    log_every: usize,
}

impl TracingEvents {
    pub fn new(log_every: usize) -> Self {
        Self { log_every: log_every.max(1) }
    }
}

impl TrainingEvents for TracingEvents {
    fn state_changed(&mut self, state: &TrainerState) {
        match state {
            TrainerState::Failed { reason } => tracing::error!("Training failed: {reason}"),
            other => tracing::debug!("Trainer state: {other}"),
        }
    }

    fn batch_finished(&mut self, p: &BatchProgress) {
        if p.batch % self.log_every == 0 {
            tracing::info!(
                "Epoch {} batch {:>5} | loss={:.4} | running_loss={:.4}",
                p.epoch,
                p.batch,
                p.loss,
                p.running_loss
            );
        }
    }

    fn epoch_finished(&mut self, s: &EpochSummary) {
        tracing::info!(
            "Epoch {:>3}/{} | mean_loss={:.4} | batches={} | {:.1}s",
            s.epoch,
            s.total_epochs,
            s.mean_loss,
            s.batches,
            s.elapsed_secs
        );
    }

    fn checkpoint_published(&mut self, epoch: usize, path: &Path) {
        tracing::info!("Checkpoint for epoch {} saved to '{}'", epoch, path.display());
    }

    fn sample_decoded(&mut self, epoch: usize, sample: &SampleTranslation) {
        tracing::info!(
            "Sample (epoch {epoch})\n  src: {}\n  ref: {}\n  hyp: {}",
            sample.source,
            sample.reference,
            sample.hypothesis
        );
    }

    fn sample_failed(&mut self, epoch: usize, error: &PipelineError) {
        tracing::warn!("Sampling after epoch {epoch} failed: {error}");
    }
}

// ─── MetricsLogger ────────────────────────────────────────────────────────────
/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the logger, writing the CSV header if the file is new.
    pub fn new(dir: &Path) -> Result<Self, PipelineError> {
        fs::create_dir_all(dir).map_err(|e| PipelineError::checkpoint_write(dir, e))?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .map_err(|e| PipelineError::checkpoint_write(&csv_path, e))?;
            writeln!(f, "epoch,mean_loss,batches,elapsed_secs")
                .map_err(|e| PipelineError::checkpoint_write(&csv_path, e))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, s: &EpochSummary) -> std::io::Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.6},{},{:.6}",
            s.epoch, s.mean_loss, s.batches, s.elapsed_secs
        )
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl TrainingEvents for MetricsLogger {
    fn epoch_finished(&mut self, summary: &EpochSummary) {
        // A metrics write failure must not abort training
        if let Err(e) = self.log(summary) {
            tracing::warn!("Cannot append to '{}': {e}", self.csv_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempDir;

    fn summary(epoch: usize) -> EpochSummary {
        EpochSummary {
            epoch,
            total_epochs: 2,
            mean_loss: 1.5,
            batches: 4,
            elapsed_secs: 0.25,
        }
    }

    #[test]
    fn test_rows_are_appended_after_header() {
        let dir = TempDir::new("metrics_rows");
        let mut logger = MetricsLogger::new(dir.path()).unwrap();
        logger.epoch_finished(&summary(1));
        logger.epoch_finished(&summary(2));

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "epoch,mean_loss,batches,elapsed_secs");
        assert_eq!(lines[1], "1,1.500000,4,0.250000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_reopening_keeps_existing_rows() {
        let dir = TempDir::new("metrics_reopen");
        MetricsLogger::new(dir.path()).unwrap().log(&summary(1)).unwrap();
        MetricsLogger::new(dir.path()).unwrap().log(&summary(2)).unwrap();

        let csv = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
