// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per pipeline action. Each one validates its
// config, picks the numeric backend, opens files or stdio and
// hands the work to Layer 5.
//
// Rules for this layer:
//   - No model math here (that's Layer 5)
//   - No argument parsing here (that's Layer 1)
//   - Errors leave as anyhow::Error with context attached
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Training with checkpointing
pub mod train_use_case;

// Perplexity scoring
pub mod score_use_case;

// Streaming translation
pub mod translate_use_case;
