// ============================================================
// Layer 4 — Batcher
// ============================================================
// Turns sentences into lazy sequences of Minibatches.
//
//   parallel()     — (source, target) pairs from a ParallelCorpus,
//                    for training and scoring
//   monolingual()  — source lines pulled from any line iterator,
//                    for translation (nothing is read ahead of
//                    the current batch)
//
// Each sentence is whitespace-split, mapped through the
// vocabulary (OOV → <unk>) and terminated with </s>. Padding
// fills each batch to its own longest sentence.
//
// Order: corpus order unless a shuffle seed is configured, in
// which case epoch e uses StdRng::seed_from_u64(seed + e).
// A batch sequence is finite; restart it by calling parallel()
// again on the same corpus.

use std::io;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::batch::Minibatch;
use crate::domain::corpus::ParallelCorpus;
use crate::domain::error::PipelineError;
use crate::domain::vocabulary::Vocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batcher {
    batch_size:   usize,
    shuffle_seed: Option<u64>,
}

impl Batcher {
    pub fn new(batch_size: usize) -> Result<Self, PipelineError> {
        if batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self { batch_size, shuffle_seed: None })
    }

    /// Permute pair order every epoch with a documented seed.
    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    /// Batches over a parallel corpus for the given epoch.
    pub fn parallel<'a>(
        &self,
        corpus:       &'a ParallelCorpus,
        source_vocab: &'a Vocabulary,
        target_vocab: &'a Vocabulary,
        epoch:        usize,
    ) -> ParallelBatches<'a> {
        let mut order: Vec<usize> = (0..corpus.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        ParallelBatches {
            corpus,
            source_vocab,
            target_vocab,
            order,
            cursor: 0,
            batch_size: self.batch_size,
            unknown_tokens: 0,
            total_tokens: 0,
        }
    }

    /// Source-only batches pulled lazily from a line iterator.
    pub fn monolingual<'a, I>(&self, vocab: &'a Vocabulary, lines: I) -> MonolingualBatches<'a, I>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        MonolingualBatches {
            lines,
            vocab,
            batch_size: self.batch_size,
            next_index: 0,
            unknown_tokens: 0,
            total_tokens: 0,
            finished: false,
        }
    }
}

// ─── Parallel batches ─────────────────────────────────────────────────────────
pub struct ParallelBatches<'a> {
    corpus:         &'a ParallelCorpus,
    source_vocab:   &'a Vocabulary,
    target_vocab:   &'a Vocabulary,
    order:          Vec<usize>,
    cursor:         usize,
    batch_size:     usize,
    unknown_tokens: usize,
    total_tokens:   usize,
}

impl ParallelBatches<'_> {
    /// Number of batches this sequence yields in total.
    pub fn batch_count(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    pub fn vocabulary_mismatch(&self) -> Option<PipelineError> {
        mismatch(self.unknown_tokens, self.total_tokens)
    }
}

impl Iterator for ParallelBatches<'_> {
    type Item = Minibatch;

    fn next(&mut self) -> Option<Minibatch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let mut sources = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());
        for &i in &indices {
            let pair = &self.corpus.pairs()[i];
            self.unknown_tokens += self.source_vocab.count_unknown(&pair.source)
                + self.target_vocab.count_unknown(&pair.target);
            let src = self.source_vocab.encode(&pair.source);
            let tgt = self.target_vocab.encode(&pair.target);
            // </s> is not counted as a corpus token
            self.total_tokens += src.len() + tgt.len() - 2;
            sources.push(src);
            targets.push(tgt);
        }
        Some(Minibatch::from_sequences(indices, sources, Some(targets)))
    }
}

// ─── Monolingual batches ──────────────────────────────────────────────────────
pub struct MonolingualBatches<'a, I> {
    lines:          I,
    vocab:          &'a Vocabulary,
    batch_size:     usize,
    next_index:     usize,
    unknown_tokens: usize,
    total_tokens:   usize,
    finished:       bool,
}

impl<I> MonolingualBatches<'_, I> {
    pub fn unknown_tokens(&self) -> usize {
        self.unknown_tokens
    }

    pub fn vocabulary_mismatch(&self) -> Option<PipelineError> {
        mismatch(self.unknown_tokens, self.total_tokens)
    }
}

impl<I> Iterator for MonolingualBatches<'_, I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = Result<Minibatch, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut indices = Vec::with_capacity(self.batch_size);
        let mut sources = Vec::with_capacity(self.batch_size);
        while sources.len() < self.batch_size {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.unknown_tokens += self.vocab.count_unknown(&line);
                    let ids = self.vocab.encode(&line);
                    self.total_tokens += ids.len() - 1;
                    indices.push(self.next_index);
                    sources.push(ids);
                    self.next_index += 1;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(PipelineError::CorpusRead {
                        path: "<input>".into(),
                        reason: format!("line {}: {e}", self.next_index + 1),
                    }));
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        if sources.is_empty() {
            None
        } else {
            Some(Ok(Minibatch::from_sequences(indices, sources, None)))
        }
    }
}

fn mismatch(unknown_tokens: usize, total_tokens: usize) -> Option<PipelineError> {
    (unknown_tokens > 0).then_some(PipelineError::VocabularyMismatch {
        unknown_tokens,
        total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab_builder::build_from_lines;
    use crate::domain::corpus::SentencePair;
    use crate::domain::vocabulary::{EOS_ID, PAD_ID, UNK_ID};

    fn corpus(pairs: &[(&str, &str)]) -> ParallelCorpus {
        pairs.iter().map(|(s, t)| SentencePair::new(*s, *t)).collect()
    }

    fn vocabs(c: &ParallelCorpus) -> (Vocabulary, Vocabulary) {
        let src = build_from_lines(c.pairs().iter().map(|p| p.source.as_str()), 100).unwrap();
        let tgt = build_from_lines(c.pairs().iter().map(|p| p.target.as_str()), 100).unwrap();
        (src, tgt)
    }

    #[test]
    fn test_two_pairs_fit_one_batch() {
        let c = corpus(&[("a b c", "x y"), ("d e", "z")]);
        let (sv, tv) = vocabs(&c);
        let batches: Vec<Minibatch> = Batcher::new(2).unwrap().parallel(&c, &sv, &tv, 0).collect();

        assert_eq!(batches.len(), 1);
        let b = &batches[0];
        assert_eq!(b.len(), 2);
        // 3 tokens + </s> and 2 tokens + </s>
        assert_eq!(b.source[0].len(), 4);
        assert_eq!(b.source_lengths, vec![4, 3]);
        assert_eq!(b.source[1][2], EOS_ID);
        assert_eq!(b.source[1][3], PAD_ID);

        let t = b.target.as_ref().unwrap();
        assert_eq!(t.tokens[0].len(), 3);
        assert_eq!(t.lengths, vec![3, 2]);
        assert_eq!(t.mask[1], vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_concatenated_batches_reconstruct_corpus() {
        let c = corpus(&[
            ("one", "uno"),
            ("two words", "dos palabras"),
            ("", ""),
            ("three little words", "tres"),
            ("four", "cuatro"),
        ]);
        let (sv, tv) = vocabs(&c);
        let batcher = Batcher::new(2).unwrap();
        let batches = batcher.parallel(&c, &sv, &tv, 0);
        assert_eq!(batches.batch_count(), 3);

        let mut seen = Vec::new();
        for b in batches {
            assert!(b.len() <= 2);
            for row in 0..b.len() {
                let src = sv.decode(b.source_row(row));
                let t = b.target.as_ref().unwrap();
                let tgt = tv.decode(&t.tokens[row][..t.lengths[row]]);
                seen.push((b.indices[row], src, tgt));
            }
        }
        assert_eq!(seen.len(), c.len());
        for (i, (idx, src, tgt)) in seen.into_iter().enumerate() {
            assert_eq!(idx, i);
            assert_eq!(src, c.pairs()[i].source);
            assert_eq!(tgt, c.pairs()[i].target);
        }
    }

    #[test]
    fn test_batches_are_restartable_and_deterministic() {
        let c = corpus(&[("a", "x"), ("b", "y"), ("c", "z")]);
        let (sv, tv) = vocabs(&c);
        let batcher = Batcher::new(2).unwrap().with_shuffle_seed(Some(7));
        let first: Vec<_> = batcher.parallel(&c, &sv, &tv, 1).collect();
        let again: Vec<_> = batcher.parallel(&c, &sv, &tv, 1).collect();
        assert_eq!(first, again);

        let mut order: Vec<usize> = first.iter().flat_map(|b| b.indices.clone()).collect();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_counts_unknown_tokens() {
        let c = corpus(&[("a b", "x")]);
        let sv = build_from_lines(["a"], 10).unwrap();
        let tv = build_from_lines(["x"], 10).unwrap();
        let mut batches = Batcher::new(4).unwrap().parallel(&c, &sv, &tv, 0);
        let b = batches.next().unwrap();
        assert_eq!(b.source[0], vec![4, UNK_ID, EOS_ID]);
        assert!(matches!(
            batches.vocabulary_mismatch(),
            Some(PipelineError::VocabularyMismatch { unknown_tokens: 1, total_tokens: 3 })
        ));
    }

    #[test]
    fn test_monolingual_keeps_blank_lines_in_order() {
        let vocab = build_from_lines(["hello world"], 10).unwrap();
        let lines = vec!["hello", "", "world hello", "x"]
            .into_iter()
            .map(|l| Ok(l.to_string()));
        let batches: Vec<Minibatch> = Batcher::new(3)
            .unwrap()
            .monolingual(&vocab, lines)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].indices, vec![0, 1, 2]);
        assert_eq!(batches[0].source_row(1), &[EOS_ID]);
        assert_eq!(batches[1].indices, vec![3]);
        assert!(batches[1].target.is_none());
    }

    #[test]
    fn test_monolingual_surfaces_read_errors() {
        let vocab = Vocabulary::reserved_only();
        let lines = vec![
            Ok("a".to_string()),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad utf-8")),
        ]
        .into_iter();
        let mut batches = Batcher::new(4).unwrap().monolingual(&vocab, lines);
        assert!(matches!(batches.next(), Some(Err(PipelineError::CorpusRead { .. }))));
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(Batcher::new(0).is_err());
    }
}
