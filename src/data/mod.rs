// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw text files and index-encoded batches:
//
//   source.txt / target.txt
//       │
//       ▼
//   ParallelTextLoader  → aligned sentence pairs (fails fast
//       │                  on unequal line counts)
//       ▼
//   VocabularyBuilder   → bounded, frequency-ranked vocabularies
//       │
//       ▼
//   Batcher             → padded Minibatches, lazily, in order
//
// Each step is independently testable.

/// Reads aligned plain-text corpora
pub mod loader;

/// Builds bounded vocabularies from tokenised text
pub mod vocab_builder;

/// Groups encoded sentences into padded minibatches
pub mod batcher;
