// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `score` and
// `translate`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, PathBuf, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::{
    score_use_case::ScoreConfig,
    train_use_case::TrainConfig,
    translate_use_case::TranslateConfig,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an encoder-decoder model on aligned source/target files
    Train(TrainArgs),

    /// Compute perplexity of a parallel corpus under a trained model
    Score(ScoreArgs),

    /// Translate pre-tokenised text line by line
    Translate(TranslateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Source-side training file, one tokenised sentence per line
    #[arg(long)]
    pub source: PathBuf,

    /// Target-side training file, line-aligned with --source
    #[arg(long)]
    pub target: PathBuf,

    /// Directory to publish checkpoints into
    #[arg(long, default_value = "checkpoints")]
    pub save_to: PathBuf,

    /// Resume from the latest checkpoint in this directory
    #[arg(long)]
    pub load_from: Option<PathBuf>,

    /// Total number of epochs (a resumed run continues counting)
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Sentence pairs per gradient update
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Source vocabulary cap, reserved symbols included
    #[arg(long, default_value_t = 30000)]
    pub source_vocab_max_size: usize,

    /// Target vocabulary cap, reserved symbols included
    #[arg(long, default_value_t = 30000)]
    pub target_vocab_max_size: usize,

    /// Decode a few training sentences after every epoch
    #[arg(long)]
    pub sample_after_epoch: bool,

    /// How many sentences to decode when sampling
    #[arg(long, default_value_t = 3)]
    pub sample_count: usize,

    /// Longest sample translation, in tokens
    #[arg(long, default_value_t = 100)]
    pub max_output_length: usize,

    /// Shuffle pair order every epoch with this seed
    #[arg(long)]
    pub shuffle_seed: Option<u64>,

    /// Keep only the newest N checkpoints
    #[arg(long)]
    pub keep_checkpoints: Option<usize>,

    /// Log the running loss every N batches
    #[arg(long, default_value_t = 100)]
    pub log_every: usize,

    /// Width of embeddings and hidden states
    #[arg(long, default_value_t = 64)]
    pub embedding_dim: usize,

    /// Number of learned positions; longer sentences share the last one
    #[arg(long, default_value_t = 256)]
    pub max_positions: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Seed for parameter initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            source_path:           a.source,
            target_path:           a.target,
            save_to:               a.save_to,
            load_from:             a.load_from,
            epochs:                a.epochs,
            batch_size:            a.batch_size,
            source_vocab_max_size: a.source_vocab_max_size,
            target_vocab_max_size: a.target_vocab_max_size,
            sample_after_epoch:    a.sample_after_epoch,
            sample_count:          a.sample_count,
            max_output_length:     a.max_output_length,
            shuffle_seed:          a.shuffle_seed,
            keep_checkpoints:      a.keep_checkpoints,
            log_every:             a.log_every,
            embedding_dim:         a.embedding_dim,
            max_positions:         a.max_positions,
            learning_rate:         a.lr,
            seed:                  a.seed,
        }
    }
}

/// All arguments for the `score` command
#[derive(Args, Debug)]
pub struct ScoreArgs {
    #[arg(long)]
    pub source: PathBuf,

    #[arg(long)]
    pub target: PathBuf,

    /// Checkpoint directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub load_from: PathBuf,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Print one corpus-level value instead of one per sentence
    #[arg(long)]
    pub corpus_average: bool,

    /// Divide each sequence NLL by its target length before exp
    #[arg(long)]
    pub normalize: bool,
}

impl From<ScoreArgs> for ScoreConfig {
    fn from(a: ScoreArgs) -> Self {
        ScoreConfig {
            source_path:    a.source,
            target_path:    a.target,
            load_from:      a.load_from,
            batch_size:     a.batch_size,
            corpus_average: a.corpus_average,
            normalize:      a.normalize,
        }
    }
}

/// All arguments for the `translate` command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Checkpoint directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub load_from: PathBuf,

    /// Input file (stdin when omitted)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Longest translation, in tokens
    #[arg(long, default_value_t = 100)]
    pub max_output_length: usize,
}

impl From<TranslateArgs> for TranslateConfig {
    fn from(a: TranslateArgs) -> Self {
        TranslateConfig {
            load_from:         a.load_from,
            input:             a.input,
            output:            a.output,
            batch_size:        a.batch_size,
            max_output_length: a.max_output_length,
        }
    }
}
