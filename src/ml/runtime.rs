// ============================================================
// Layer 5 — Burn Model Runtime
// ============================================================
// ModelRuntime implementation on burn's CPU ndarray backend.
//
//   TrainBackend = Autodiff<NdArray>   gradients + Adam updates
//   InferBackend = NdArray             model.valid() for scoring
//                                      and decoding
//
// Parameters are stored with NamedMpkFileRecorder at full
// precision, so load(save()) reproduces evaluate_step output
// exactly. Optimizer moments are not part of a checkpoint; a
// resumed run starts with fresh Adam state.
//
// Determinism: the backend RNG is seeded from the configured
// seed before parameters are initialised.

use std::path::Path;

use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{ElementConversion, TensorData},
};

use crate::domain::batch::{Minibatch, TargetSide};
use crate::domain::error::PipelineError;
use crate::domain::traits::ModelRuntime;
use crate::domain::training::ModelHyperparameters;
use crate::domain::vocabulary::{BOS_ID, EOS_ID, PAD_ID};
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};

type TrainBackend = Autodiff<NdArray>;
type InferBackend = NdArray;

type StepFn = Box<
    dyn FnMut(f64, Seq2SeqModel<TrainBackend>, GradientsParams) -> Seq2SeqModel<TrainBackend>,
>;

/// File stem for parameters; the recorder adds ".mpk".
const MODEL_FILE_STEM: &str = "model";

pub struct BurnRuntime {
    model:          Seq2SeqModel<TrainBackend>,
    learning_rate:  f64,
    device:         NdArrayDevice,
    optimizer_step: StepFn,
}

impl ModelRuntime for BurnRuntime {
    fn initialize(
        source_vocab_size: usize,
        target_vocab_size: usize,
        hp:                &ModelHyperparameters,
    ) -> Result<Self, PipelineError> {
        if source_vocab_size == 0 || target_vocab_size == 0 {
            return Err(PipelineError::runtime("vocabulary sizes must be non-zero"));
        }
        if hp.embedding_dim == 0 || hp.max_positions == 0 {
            return Err(PipelineError::runtime("embedding_dim and max_positions must be non-zero"));
        }

        let device = NdArrayDevice::default();
        <TrainBackend as Backend>::seed(hp.seed);

        let config = Seq2SeqConfig::new(
            source_vocab_size,
            target_vocab_size,
            hp.embedding_dim,
            hp.max_positions,
        );
        let model: Seq2SeqModel<TrainBackend> = config.init(&device);

        // m = β1*m + (1-β1)*g ; v = β2*v + (1-β2)*g² ; θ -= lr * m / (√v + ε)
        let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
        let optimizer_step: StepFn = Box::new(
            move |lr: f64, model: Seq2SeqModel<TrainBackend>, grads: GradientsParams| {
                optim.step(lr, model, grads)
            },
        );

        tracing::debug!(
            "Initialised model: src_vocab={} tgt_vocab={} d_model={} max_positions={}",
            source_vocab_size,
            target_vocab_size,
            hp.embedding_dim,
            hp.max_positions
        );

        Ok(Self {
            model,
            learning_rate: hp.learning_rate,
            device,
            optimizer_step,
        })
    }

    fn train_step(&mut self, batch: &Minibatch) -> Result<f64, PipelineError> {
        let target = require_target(batch)?;
        let tokens = target.token_count();

        let nll = self.model.token_nll(
            int_tensor::<TrainBackend>(&batch.source, &self.device),
            int_tensor::<TrainBackend>(&decoder_inputs(target), &self.device),
            int_tensor::<TrainBackend>(&target.tokens, &self.device),
            float_tensor::<TrainBackend>(&target.mask, &self.device),
        );
        let loss = nll.sum().div_scalar(tokens as f32);

        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return Err(PipelineError::runtime(format!("non-finite loss {loss_value}")));
        }

        // Backward pass + Adam update
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = (self.optimizer_step)(self.learning_rate, self.model.clone(), grads);

        Ok(loss_value)
    }

    fn evaluate_step(&self, batch: &Minibatch) -> Result<Vec<f64>, PipelineError> {
        let target = require_target(batch)?;
        // model.valid() → Seq2SeqModel<InferBackend>, no autodiff graph
        let model = self.model.valid();

        let nll = model.token_nll(
            int_tensor::<InferBackend>(&batch.source, &self.device),
            int_tensor::<InferBackend>(&decoder_inputs(target), &self.device),
            int_tensor::<InferBackend>(&target.tokens, &self.device),
            float_tensor::<InferBackend>(&target.mask, &self.device),
        );
        let sums: Vec<f32> = nll
            .sum_dim(1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::runtime(format!("cannot read losses: {e:?}")))?;

        Ok(sums
            .into_iter()
            .zip(&target.lengths)
            .map(|(sum, &len)| f64::from(sum) / len.max(1) as f64)
            .collect())
    }

    fn decode(&self, source: &[usize], max_output_length: usize) -> Result<Vec<usize>, PipelineError> {
        let model = self.model.valid();
        let row = if source.is_empty() { vec![EOS_ID] } else { source.to_vec() };

        let source = int_tensor::<InferBackend>(&[row], &self.device);
        let padding = source.clone().equal_elem(PAD_ID as i64);
        let memory = model.encode(source);

        let mut output = Vec::new();
        let mut previous = BOS_ID;
        for step in 0..max_output_length {
            let prev = int_tensor::<InferBackend>(&[vec![previous]], &self.device);
            let logits = model.decode_logits(memory.clone(), padding.clone(), prev, step);
            let next = logits.argmax(2).into_scalar().elem::<i64>() as usize;
            if next == EOS_ID {
                break;
            }
            output.push(next);
            previous = next;
        }
        Ok(output)
    }

    fn save(&self, dir: &Path) -> Result<(), PipelineError> {
        let path = dir.join(MODEL_FILE_STEM);
        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(self.model.clone().into_record(), path.clone())
            .map_err(|e| PipelineError::checkpoint_write(&path, format!("{e:?}")))?;
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<(), PipelineError> {
        let path = dir.join(MODEL_FILE_STEM);
        if !path.with_extension("mpk").is_file() {
            return Err(PipelineError::missing_checkpoint(dir, "model parameters (model.mpk) are missing"));
        }

        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), &self.device)
            .map_err(|e| {
                PipelineError::missing_checkpoint(&path, format!("cannot load parameters: {e:?}"))
            })?;
        self.model = self.model.clone().load_record(record);
        Ok(())
    }
}

fn require_target(batch: &Minibatch) -> Result<&TargetSide, PipelineError> {
    let target = batch
        .target
        .as_ref()
        .ok_or_else(|| PipelineError::runtime("batch has no target side"))?;
    if target.token_count() == 0 {
        return Err(PipelineError::runtime("batch has no target tokens"));
    }
    Ok(target)
}

/// Teacher forcing input: <s> followed by the target shifted right.
fn decoder_inputs(target: &TargetSide) -> Vec<Vec<usize>> {
    target
        .tokens
        .iter()
        .map(|row| {
            std::iter::once(BOS_ID)
                .chain(row.iter().copied().take(row.len().saturating_sub(1)))
                .collect()
        })
        .collect()
}

fn int_tensor<B: Backend>(rows: &[Vec<usize>], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.first().map_or(0, Vec::len);
    let flat: Vec<i64> = rows
        .iter()
        .flat_map(|row| row.iter().map(|&id| id as i64))
        .collect();
    Tensor::from_data(
        TensorData::new(flat, [rows.len(), width]).convert::<B::IntElem>(),
        device,
    )
}

fn float_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let width = rows.first().map_or(0, Vec::len);
    let flat: Vec<f32> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    Tensor::from_data(
        TensorData::new(flat, [rows.len(), width]).convert::<B::FloatElem>(),
        device,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempDir;

    fn tiny() -> ModelHyperparameters {
        ModelHyperparameters {
            embedding_dim: 8,
            max_positions: 16,
            learning_rate: 1e-2,
            seed:          7,
        }
    }

    fn batch() -> Minibatch {
        Minibatch::from_sequences(
            vec![0, 1],
            vec![vec![4, 5, 6, EOS_ID], vec![7, EOS_ID]],
            Some(vec![vec![4, 5, EOS_ID], vec![6, EOS_ID]]),
        )
    }

    #[test]
    fn test_decoder_inputs_shift_right() {
        let b = batch();
        let inputs = decoder_inputs(b.target.as_ref().unwrap());
        assert_eq!(inputs[0], vec![BOS_ID, 4, 5]);
        assert_eq!(inputs[1], vec![BOS_ID, 6, EOS_ID]);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut rt = BurnRuntime::initialize(10, 8, &tiny()).unwrap();
        let b = batch();
        let first = rt.train_step(&b).unwrap();
        let mut last = first;
        for _ in 0..40 {
            last = rt.train_step(&b).unwrap();
        }
        assert!(first.is_finite());
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }

    #[test]
    fn test_evaluate_returns_one_loss_per_row() {
        let rt = BurnRuntime::initialize(10, 8, &tiny()).unwrap();
        let losses = rt.evaluate_step(&batch()).unwrap();
        assert_eq!(losses.len(), 2);
        assert!(losses.iter().all(|l| l.is_finite() && *l > 0.0));
    }

    #[test]
    fn test_save_load_round_trip_is_exact() {
        let dir = TempDir::new("burn_roundtrip");
        let b = batch();

        let mut trained = BurnRuntime::initialize(10, 8, &tiny()).unwrap();
        for _ in 0..3 {
            trained.train_step(&b).unwrap();
        }
        trained.save(dir.path()).unwrap();
        assert!(dir.path().join("model.mpk").is_file());

        let mut restored = BurnRuntime::initialize(10, 8, &ModelHyperparameters { seed: 99, ..tiny() }).unwrap();
        restored.load(dir.path()).unwrap();

        let before = trained.evaluate_step(&b).unwrap();
        let after = restored.evaluate_step(&b).unwrap();
        for (x, y) in before.iter().zip(&after) {
            assert!((x - y).abs() < 1e-6, "{x} vs {y}");
        }
        assert_eq!(trained.decode(&[4, 5, EOS_ID], 6).unwrap(), restored.decode(&[4, 5, EOS_ID], 6).unwrap());
    }

    #[test]
    fn test_decode_respects_max_length() {
        let rt = BurnRuntime::initialize(10, 8, &tiny()).unwrap();
        let out = rt.decode(&[4, 5, EOS_ID], 3).unwrap();
        assert!(out.len() <= 3);
        assert!(!out.contains(&EOS_ID));
        assert!(rt.decode(&[], 0).unwrap().is_empty());
        // Longer than max_positions must not index out of range
        assert!(rt.decode(&[4; 40], 20).unwrap().len() <= 20);
    }

    #[test]
    fn test_load_from_empty_dir_is_checkpoint_not_found() {
        let dir = TempDir::new("burn_missing");
        let mut rt = BurnRuntime::initialize(10, 8, &tiny()).unwrap();
        assert!(matches!(rt.load(dir.path()), Err(PipelineError::CheckpointNotFound { .. })));
    }

    #[test]
    fn test_batch_without_target_is_rejected() {
        let mut rt = BurnRuntime::initialize(10, 8, &tiny()).unwrap();
        let source_only = Minibatch::from_sequences(vec![0], vec![vec![4, EOS_ID]], None);
        assert!(matches!(rt.train_step(&source_only), Err(PipelineError::ModelRuntime(_))));
    }
}
