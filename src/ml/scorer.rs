// ============================================================
// Layer 5 — Scorer
// ============================================================
// Perplexity of a parallel corpus under a trained model.
//
//   normalize = true:   ppl_i = exp(mean NLL per target token)
//   normalize = false:  ppl_i = exp(summed NLL of the sequence)
//                       (padding excluded, </s> included)
//
//   corpus value:       mean_i(ppl_i) under the same setting
//
// The corpus value is always the plain mean of the list-mode
// values, e.g. [2.0, 8.0] → 5.0. Unnormalised values grow with
// sentence length and overflow to inf for long, poorly
// modelled targets.
//
// Tokens missing from the checkpoint's vocabularies are scored
// as <unk>; that is logged as a VocabularyMismatch warning and
// never fails the run.

use std::io::{self, Write};
use std::path::Path;

use crate::data::batcher::Batcher;
use crate::domain::corpus::ParallelCorpus;
use crate::domain::error::PipelineError;
use crate::domain::traits::ModelRuntime;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::CheckpointStore;

/// Score of one (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceScore {
    /// Mean negative log-likelihood per target token
    pub mean_nll: f64,
    /// Target tokens scored, </s> included
    pub tokens:   usize,
}

impl SequenceScore {
    /// Negative log-likelihood summed over the target tokens.
    pub fn total_nll(&self) -> f64 {
        self.mean_nll * self.tokens as f64
    }

    pub fn perplexity(&self, normalize: bool) -> f64 {
        if normalize {
            self.mean_nll.exp()
        } else {
            self.total_nll().exp()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreReport {
    PerSequence(Vec<f64>),
    CorpusAverage(f64),
}

impl ScoreReport {
    /// One value per line, six decimals.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        match self {
            Self::PerSequence(values) => {
                for value in values {
                    writeln!(out, "{value:.6}")?;
                }
            }
            Self::CorpusAverage(value) => writeln!(out, "{value:.6}")?,
        }
        out.flush()
    }
}

pub struct Scorer<R: ModelRuntime> {
    runtime:      R,
    source_vocab: Vocabulary,
    target_vocab: Vocabulary,
}

impl<R: ModelRuntime> Scorer<R> {
    pub fn new(runtime: R, source_vocab: Vocabulary, target_vocab: Vocabulary) -> Self {
        Self { runtime, source_vocab, target_vocab }
    }

    /// Restore model and vocabularies from the latest checkpoint in `dir`.
    pub fn from_checkpoint(dir: &Path) -> Result<Self, PipelineError> {
        let (runtime, checkpoint) = CheckpointStore::new(dir).restore::<R>()?;
        tracing::info!("Scoring with checkpoint from epoch {}", checkpoint.manifest.epoch);
        Ok(Self::new(runtime, checkpoint.source_vocab, checkpoint.target_vocab))
    }

    /// Per-sequence scores in corpus order.
    pub fn score(&self, corpus: &ParallelCorpus, batch_size: usize) -> Result<Vec<SequenceScore>, PipelineError> {
        let batcher = Batcher::new(batch_size)?;
        let mut batches = batcher.parallel(corpus, &self.source_vocab, &self.target_vocab, 0);

        let mut scores: Vec<Option<SequenceScore>> = vec![None; corpus.len()];
        for batch in batches.by_ref() {
            let losses = self.runtime.evaluate_step(&batch)?;
            let lengths = batch
                .target
                .as_ref()
                .map(|t| t.lengths.as_slice())
                .unwrap_or_default();
            if losses.len() != batch.len() || lengths.len() != batch.len() {
                return Err(PipelineError::runtime(format!(
                    "evaluate_step returned {} losses for a batch of {}",
                    losses.len(),
                    batch.len()
                )));
            }
            for ((&index, loss), &tokens) in batch.indices.iter().zip(losses).zip(lengths) {
                scores[index] = Some(SequenceScore { mean_nll: loss, tokens });
            }
        }

        if let Some(mismatch) = batches.vocabulary_mismatch() {
            tracing::warn!("{mismatch}");
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| PipelineError::runtime(format!("sequence {i} was never scored"))))
            .collect()
    }

    /// Score the corpus and shape the result for output.
    pub fn report(
        &self,
        corpus:         &ParallelCorpus,
        batch_size:     usize,
        corpus_average: bool,
        normalize:      bool,
    ) -> Result<ScoreReport, PipelineError> {
        let scores = self.score(corpus, batch_size)?;
        Ok(if corpus_average {
            ScoreReport::CorpusAverage(corpus_perplexity(&scores, normalize))
        } else {
            ScoreReport::PerSequence(scores.iter().map(|s| s.perplexity(normalize)).collect())
        })
    }
}

/// Mean of the per-sequence values; NaN for an empty slice.
pub fn corpus_perplexity(scores: &[SequenceScore], normalize: bool) -> f64 {
    if scores.is_empty() {
        return f64::NAN;
    }
    scores.iter().map(|s| s.perplexity(normalize)).sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab_builder::build_from_lines;
    use crate::domain::corpus::SentencePair;
    use crate::domain::training::ModelHyperparameters;
    use crate::test_support::{ScriptedRuntime, TempDir};

    fn scorer() -> Scorer<ScriptedRuntime> {
        let src = build_from_lines(["a b c", "d e"], 10).unwrap();
        let tgt = build_from_lines(["x y", "z"], 10).unwrap();
        let runtime = ScriptedRuntime::initialize(src.len(), tgt.len(), &ModelHyperparameters::default()).unwrap();
        Scorer::new(runtime, src, tgt)
    }

    fn corpus() -> ParallelCorpus {
        ParallelCorpus::new(vec![
            SentencePair::new("a b c", "x y"),
            SentencePair::new("d e", "z"),
            SentencePair::new("a", "x y z"),
        ])
    }

    #[test]
    fn test_unnormalised_average_is_plain_mean() {
        // Summed NLL of ln 2 and ln 8
        let scores = [
            SequenceScore { mean_nll: 2f64.ln() / 2.0, tokens: 2 },
            SequenceScore { mean_nll: 8f64.ln() / 4.0, tokens: 4 },
        ];
        assert!((scores[0].perplexity(false) - 2.0).abs() < 1e-9);
        assert!((scores[1].perplexity(false) - 8.0).abs() < 1e-9);
        assert!((corpus_perplexity(&scores, false) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalised_average_uses_per_token_perplexity() {
        let scores = [
            SequenceScore { mean_nll: 2f64.ln(), tokens: 3 },
            SequenceScore { mean_nll: 8f64.ln(), tokens: 10 },
        ];
        // Lengths do not weight the normalised mean
        assert!((corpus_perplexity(&scores, true) - 5.0).abs() < 1e-9);
        assert!(corpus_perplexity(&[], true).is_nan());
        assert!(corpus_perplexity(&[], false).is_nan());
    }

    #[test]
    fn test_per_sequence_scores_keep_corpus_order() {
        let scores = scorer().score(&corpus(), 2).unwrap();
        assert_eq!(scores.len(), 3);
        // ScriptedRuntime: ln(1) + 0.01 * target length (with </s>)
        let tokens: Vec<usize> = scores.iter().map(|s| s.tokens).collect();
        assert_eq!(tokens, vec![3, 2, 4]);
        assert!((scores[2].mean_nll - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_corpus_average_matches_mean_of_list() {
        let scorer = scorer();
        for normalize in [false, true] {
            let ScoreReport::PerSequence(list) = scorer.report(&corpus(), 2, false, normalize).unwrap() else {
                panic!("expected per-sequence report");
            };
            let ScoreReport::CorpusAverage(avg) = scorer.report(&corpus(), 2, true, normalize).unwrap() else {
                panic!("expected corpus average");
            };
            let mean = list.iter().sum::<f64>() / list.len() as f64;
            assert!((avg - mean).abs() < 1e-12, "normalize = {normalize}");
        }
    }

    #[test]
    fn test_normalize_switches_list_values() {
        let scorer = scorer();
        let ScoreReport::PerSequence(per_token) = scorer.report(&corpus(), 2, false, true).unwrap() else {
            panic!("expected per-sequence report");
        };
        let ScoreReport::PerSequence(summed) = scorer.report(&corpus(), 2, false, false).unwrap() else {
            panic!("expected per-sequence report");
        };
        // Third pair: 4 target tokens at mean NLL 0.04
        assert!((per_token[2] - 0.04f64.exp()).abs() < 1e-12);
        assert!((summed[2] - 0.16f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_tokens_do_not_fail_scoring() {
        let unseen = ParallelCorpus::new(vec![SentencePair::new("never seen", "nope")]);
        assert_eq!(scorer().score(&unseen, 4).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir = TempDir::new("scorer_missing");
        assert!(matches!(
            Scorer::<ScriptedRuntime>::from_checkpoint(dir.path()),
            Err(PipelineError::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn test_report_formatting() {
        let mut out = Vec::new();
        ScoreReport::PerSequence(vec![2.0, 8.5]).write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2.000000\n8.500000\n");

        let mut out = Vec::new();
        ScoreReport::CorpusAverage(5.0).write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "5.000000\n");
    }
}
