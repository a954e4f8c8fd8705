// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, built on `clap`.
// All work is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`     — trains a model and publishes checkpoints
//   2. `score`     — prints perplexities for a parallel corpus
//   3. `translate` — translates stdin/file to stdout/file
//
// Only translations and scores go to stdout; logs go to stderr.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ScoreArgs, TrainArgs, TranslateArgs};

#[derive(Parser, Debug)]
#[command(
    name = "nmt-pipeline",
    version,
    about = "Train, score and run a sequence-to-sequence translation model."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Score(args)     => run_score(args),
            Commands::Translate(args) => run_translate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let report = TrainUseCase::new(args.into()).execute()?;
    match report.checkpoints.last() {
        Some(path) => tracing::info!("Latest checkpoint: '{}'", path.display()),
        None => tracing::info!("No new checkpoint was written"),
    }
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<()> {
    use crate::application::score_use_case::ScoreUseCase;

    ScoreUseCase::new(args.into()).execute_to_stdout()
}

fn run_translate(args: TranslateArgs) -> Result<()> {
    use crate::application::translate_use_case::TranslateUseCase;

    TranslateUseCase::new(args.into()).execute()?;
    Ok(())
}
