// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// All Burn framework code lives in model.rs and runtime.rs.
// Trainer, Scorer and Translator only see the ModelRuntime
// trait, so they are tested with a scripted runtime and run in
// production on BurnRuntime.
//
//   model.rs      — attention encoder-decoder (Burn Module):
//                   token + position embeddings, dot-product
//                   attention over the source, tanh combiner,
//                   target vocabulary projection
//
//   runtime.rs    — BurnRuntime: ModelRuntime on
//                   Autodiff<NdArray> with Adam, greedy decode,
//                   full-precision parameter snapshots
//
//   trainer.rs    — the epoch state machine: train, publish a
//                   checkpoint, optionally sample
//
//   scorer.rs     — per-sequence and corpus perplexity
//
//   translator.rs — streaming line-by-line translation
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Luong et al. (2015) Effective Approaches to
//            Attention-based Neural Machine Translation

/// Encoder-decoder architecture
pub mod model;

/// Burn-backed ModelRuntime
pub mod runtime;

/// Epoch loop with checkpointing and sampling
pub mod trainer;

/// Perplexity scoring
pub mod scorer;

/// Streaming translation
pub mod translator;
