// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns shared by the training, scoring and
// translation workflows:
//
//   checkpoint.rs  — CheckpointStore: atomic publish of model
//                    parameters + vocabularies, the "latest"
//                    marker, retention and the single-writer
//                    lock for a checkpoint directory
//
//   vocab_store.rs — Vocabulary persistence as tokenizers
//                    WordLevel JSON
//
//   metrics.rs     — TrainingEvents sinks: tracing output and
//                    a per-epoch metrics CSV

/// Checkpoint directory management
pub mod checkpoint;

/// Vocabulary save/load
pub mod vocab_store;

/// Training event sinks (tracing + CSV)
pub mod metrics;
