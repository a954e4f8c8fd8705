// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types and traits describing the translation
// pipeline. No burn types, no file I/O.
//
//   vocabulary — bounded token <-> index mapping
//   corpus     — aligned source/target sentence pairs
//   batch      — padded, index-encoded minibatches
//   training   — trainer state machine and event records
//   traits     — ModelRuntime, TrainingEvents, Persistable
//   error      — PipelineError taxonomy

pub mod batch;

pub mod corpus;

pub mod error;

pub mod training;

pub mod traits;

pub mod vocabulary;
