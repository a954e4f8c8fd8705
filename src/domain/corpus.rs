// ============================================================
// Layer 3 — Parallel Corpus Domain Type
// ============================================================
// Line N of the source file corresponds to line N of the
// target file. The loader in data::loader guarantees both
// sides have the same length before a ParallelCorpus exists.

use serde::{Deserialize, Serialize};

/// One aligned (source, target) sentence pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    pub source: String,
    pub target: String,
}

impl SentencePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelCorpus {
    pairs: Vec<SentencePair>,
}

impl ParallelCorpus {
    pub fn new(pairs: Vec<SentencePair>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[SentencePair] {
        &self.pairs
    }
}

impl FromIterator<SentencePair> for ParallelCorpus {
    fn from_iter<I: IntoIterator<Item = SentencePair>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
