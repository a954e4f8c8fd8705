// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop generic over any ModelRuntime:
//
//   Initializing   lock save_to, load corpus, build or restore
//                  vocabularies, initialise/restore the model,
//                  write the effective train_config.json
//   RunningEpoch   train_step per minibatch, running loss
//   Checkpointing  atomic publish via CheckpointStore, then
//                  optional pruning of old checkpoints
//   Sampling       (optional) decode the first few training
//                  sources; failures are reported, not fatal
//   Completed      all epochs done
//   Failed         any fatal error; terminal, never retried
//
// Every state change and milestone goes through the
// TrainingEvents sinks; the loop itself never logs loss.
//
// Resume: with load_from set, numbering continues at the
// restored checkpoint's epoch + 1 and stops at `epochs`. The
// checkpoint's model hyperparameters win over the command line.

use std::path::Path;
use std::time::Instant;

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::Batcher, loader::ParallelTextLoader, vocab_builder::build_from_file};
use crate::domain::corpus::ParallelCorpus;
use crate::domain::error::PipelineError;
use crate::domain::traits::{ModelRuntime, TrainingEvents};
use crate::domain::training::{
    BatchProgress, EpochSummary, ModelHyperparameters, SampleTranslation, TrainerState,
    TrainingReport,
};
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::{CheckpointLock, CheckpointManifest, CheckpointStore};

type Sinks = Vec<Box<dyn TrainingEvents>>;

pub struct Trainer<R: ModelRuntime> {
    config:          TrainConfig,
    corpus:          ParallelCorpus,
    source_vocab:    Vocabulary,
    target_vocab:    Vocabulary,
    hyperparameters: ModelHyperparameters,
    runtime:         R,
    batcher:         Batcher,
    store:           CheckpointStore,
    start_epoch:     usize,
    state:           TrainerState,
    sinks:           Sinks,
    // Released when the trainer is dropped
    _lock:           CheckpointLock,
}

/// Everything Initializing produces besides the lock.
struct Prepared<R> {
    corpus:          ParallelCorpus,
    source_vocab:    Vocabulary,
    target_vocab:    Vocabulary,
    hyperparameters: ModelHyperparameters,
    runtime:         R,
    start_epoch:     usize,
}

impl<R: ModelRuntime> Trainer<R> {
    pub fn initialize(config: &TrainConfig, mut sinks: Sinks) -> Result<Self, PipelineError> {
        config.validate()?;
        let store = CheckpointStore::new(&config.save_to);
        let lock = store.lock()?;

        notify(&mut sinks, |s| s.state_changed(&TrainerState::Initializing));
        let prepared = prepare::<R>(config, &store).and_then(|prepared| {
            let effective = config.with_hyperparameters(&prepared.hyperparameters);
            store.save_config(&effective)?;
            Ok((prepared, effective))
        });
        let (prepared, config) = match prepared {
            Ok(done) => done,
            Err(e) => {
                notify(&mut sinks, |s| s.state_changed(&TrainerState::from(&e)));
                return Err(e);
            }
        };

        let batcher = Batcher::new(config.batch_size)?.with_shuffle_seed(config.shuffle_seed);
        tracing::debug!(
            "{} training pair(s), checkpoints in '{}'",
            prepared.corpus.len(),
            store.dir().display()
        );
        Ok(Self {
            config,
            corpus: prepared.corpus,
            source_vocab: prepared.source_vocab,
            target_vocab: prepared.target_vocab,
            hyperparameters: prepared.hyperparameters,
            runtime: prepared.runtime,
            batcher,
            store,
            start_epoch: prepared.start_epoch,
            state: TrainerState::Initializing,
            sinks,
            _lock: lock,
        })
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn source_vocab(&self) -> &Vocabulary {
        &self.source_vocab
    }

    pub fn target_vocab(&self) -> &Vocabulary {
        &self.target_vocab
    }

    /// Run every remaining epoch. On error the trainer is left in
    /// `Failed` and the last published checkpoint is untouched.
    pub fn run(&mut self) -> Result<TrainingReport, PipelineError> {
        if self.state.is_terminal() {
            return Err(PipelineError::InvalidConfig(format!(
                "trainer has already {}; initialise a new one to continue",
                self.state
            )));
        }

        let mut report = TrainingReport {
            epochs_completed: 0,
            final_loss:       None,
            checkpoints:      Vec::new(),
        };

        if self.start_epoch > self.config.epochs {
            tracing::info!(
                "Checkpoint already covers {} epoch(s); nothing to train",
                self.config.epochs
            );
        }

        for epoch in self.start_epoch..=self.config.epochs {
            if let Err(e) = self.run_cycle(epoch, &mut report) {
                self.transition(TrainerState::from(&e));
                return Err(e);
            }
        }

        self.transition(TrainerState::Completed);
        Ok(report)
    }

    // ─── One epoch: train → checkpoint → [sample] ───────────────────────────
    fn run_cycle(&mut self, epoch: usize, report: &mut TrainingReport) -> Result<(), PipelineError> {
        self.transition(TrainerState::RunningEpoch { epoch });
        let summary = self.run_epoch(epoch)?;
        notify(&mut self.sinks, |s| s.epoch_finished(&summary));

        self.transition(TrainerState::Checkpointing { epoch });
        let manifest = CheckpointManifest {
            epoch,
            source_vocab_size: self.source_vocab.len(),
            target_vocab_size: self.target_vocab.len(),
            hyperparameters:   self.hyperparameters.clone(),
            mean_loss:         Some(summary.mean_loss),
        };
        let path = self
            .store
            .publish(&manifest, &self.runtime, &self.source_vocab, &self.target_vocab)?;
        notify(&mut self.sinks, |s| s.checkpoint_published(epoch, &path));
        report.checkpoints.push(path);

        if let Some(keep) = self.config.keep_checkpoints {
            let removed = self.store.prune(keep)?;
            report.checkpoints.retain(|p| !removed.contains(p));
        }

        if self.config.sample_after_epoch {
            self.transition(TrainerState::Sampling { epoch });
            self.sample(epoch);
        }

        report.epochs_completed += 1;
        report.final_loss = Some(summary.mean_loss);
        Ok(())
    }

    fn run_epoch(&mut self, epoch: usize) -> Result<EpochSummary, PipelineError> {
        let started = Instant::now();
        let mut batches = self
            .batcher
            .parallel(&self.corpus, &self.source_vocab, &self.target_vocab, epoch);
        tracing::debug!("Epoch {epoch}: {} batch(es)", batches.batch_count());

        let mut loss_sum = 0.0f64;
        let mut count = 0usize;
        for batch in batches.by_ref() {
            let loss = self.runtime.train_step(&batch)?;
            loss_sum += loss;
            count += 1;

            let progress = BatchProgress {
                epoch,
                batch: count,
                loss,
                running_loss: loss_sum / count as f64,
            };
            notify(&mut self.sinks, |s| s.batch_finished(&progress));
        }

        if let Some(mismatch) = batches.vocabulary_mismatch() {
            tracing::debug!("Epoch {epoch}: {mismatch}");
        }

        Ok(EpochSummary {
            epoch,
            total_epochs: self.config.epochs,
            mean_loss:    if count > 0 { loss_sum / count as f64 } else { f64::NAN },
            batches:      count,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn sample(&mut self, epoch: usize) {
        let count = self.config.sample_count.min(self.corpus.len());
        for pair in &self.corpus.pairs()[..count] {
            let ids = self.source_vocab.encode(&pair.source);
            match self.runtime.decode(&ids, self.config.max_output_length) {
                Ok(hypothesis) => {
                    let sample = SampleTranslation {
                        source:     pair.source.clone(),
                        reference:  pair.target.clone(),
                        hypothesis: self.target_vocab.decode(&hypothesis),
                    };
                    notify(&mut self.sinks, |s| s.sample_decoded(epoch, &sample));
                }
                Err(e) => notify(&mut self.sinks, |s| s.sample_failed(epoch, &e)),
            }
        }
    }

    fn transition(&mut self, state: TrainerState) {
        notify(&mut self.sinks, |s| s.state_changed(&state));
        self.state = state;
    }

    #[cfg(test)]
    fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }
}

fn notify(sinks: &mut Sinks, mut event: impl FnMut(&mut dyn TrainingEvents)) {
    for sink in sinks.iter_mut() {
        event(sink.as_mut());
    }
}

// ─── Initializing ─────────────────────────────────────────────────────────────
fn prepare<R: ModelRuntime>(config: &TrainConfig, store: &CheckpointStore) -> Result<Prepared<R>, PipelineError> {
    let resuming_in_place = config
        .load_from
        .as_deref()
        .is_some_and(|dir| dir == config.save_to.as_path());
    if store.has_latest() && !resuming_in_place {
        return Err(PipelineError::InvalidConfig(format!(
            "'{}' already holds checkpoints; resume with --load-from pointing at it or choose another --save-to",
            config.save_to.display()
        )));
    }

    let corpus = ParallelTextLoader::new(&config.source_path, &config.target_path).load()?;
    if corpus.is_empty() {
        return Err(PipelineError::corpus(&config.source_path, "training corpus is empty"));
    }

    match config.load_from.as_deref() {
        Some(dir) => resume(config, dir, corpus),
        None => {
            let source_vocab = build_from_file(&config.source_path, config.source_vocab_max_size)?;
            let target_vocab = build_from_file(&config.target_path, config.target_vocab_max_size)?;
            let hyperparameters = config.hyperparameters();
            let runtime = R::initialize(source_vocab.len(), target_vocab.len(), &hyperparameters)?;
            Ok(Prepared {
                corpus,
                source_vocab,
                target_vocab,
                hyperparameters,
                runtime,
                start_epoch: 1,
            })
        }
    }
}

fn resume<R: ModelRuntime>(
    config: &TrainConfig,
    dir:    &Path,
    corpus: ParallelCorpus,
) -> Result<Prepared<R>, PipelineError> {
    let (runtime, checkpoint) = CheckpointStore::new(dir).restore::<R>()?;

    // The architecture is fixed by the checkpoint
    let hyperparameters = checkpoint.manifest.hyperparameters;
    if hyperparameters != config.hyperparameters() {
        tracing::warn!("Resuming with the checkpoint's model hyperparameters; command-line values are ignored");
    }

    tracing::info!(
        "Resuming from epoch {} (src vocab {}, tgt vocab {})",
        checkpoint.manifest.epoch,
        checkpoint.source_vocab.len(),
        checkpoint.target_vocab.len()
    );
    Ok(Prepared {
        corpus,
        source_vocab: checkpoint.source_vocab,
        target_vocab: checkpoint.target_vocab,
        hyperparameters,
        runtime,
        start_epoch: checkpoint.manifest.epoch + 1,
    })
}
