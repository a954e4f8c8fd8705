// ============================================================
// Layer 4 — Vocabulary Builder
// ============================================================
// Counts whitespace-separated tokens across a whole corpus file
// and keeps the (max_size - 4) most frequent ones after the four
// reserved symbols.
//
// Ranking: frequency descending, ties broken by first-seen
// order. Same file + same max_size always gives the same
// indices, which downstream checkpoints rely on.
//
// Tokens cut by the size bound simply map to <unk> at use time.

use std::collections::HashMap;
use std::path::Path;

use crate::data::loader::open_lines;
use crate::domain::error::PipelineError;
use crate::domain::vocabulary::{Vocabulary, RESERVED_TOKENS};

pub struct VocabularyBuilder {
    max_size: usize,
    /// token -> (count, first-seen position)
    counts:   HashMap<String, (usize, usize)>,
}

impl VocabularyBuilder {
    pub fn new(max_size: usize) -> Result<Self, PipelineError> {
        if max_size < RESERVED_TOKENS.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "vocabulary max size {max_size} cannot hold the {} reserved symbols",
                RESERVED_TOKENS.len()
            )));
        }
        Ok(Self { max_size, counts: HashMap::new() })
    }

    /// Count the tokens of one line.
    pub fn observe(&mut self, line: &str) {
        for token in line.split_whitespace() {
            if RESERVED_TOKENS.contains(&token) {
                continue;
            }
            let seen = self.counts.len();
            self.counts.entry(token.to_string()).or_insert((0, seen)).0 += 1;
        }
    }

    pub fn distinct_tokens(&self) -> usize {
        self.counts.len()
    }

    pub fn build(self) -> Vocabulary {
        let mut ranked: Vec<(String, (usize, usize))> = self.counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked.truncate(self.max_size - RESERVED_TOKENS.len());

        let mut vocab = Vocabulary::reserved_only();
        for (token, _) in &ranked {
            vocab.push(token);
        }
        vocab
    }
}

/// Build a vocabulary from every line of a tokenised text file.
pub fn build_from_file(path: &Path, max_size: usize) -> Result<Vocabulary, PipelineError> {
    let mut builder = VocabularyBuilder::new(max_size)?;
    for line in open_lines(path)? {
        let line = line.map_err(|e| PipelineError::corpus(path, e))?;
        builder.observe(&line);
    }

    let distinct = builder.distinct_tokens();
    let vocab = builder.build();
    tracing::info!(
        "Built vocabulary from '{}': {} entries ({} distinct tokens, cap {})",
        path.display(),
        vocab.len(),
        distinct,
        max_size
    );
    Ok(vocab)
}

/// Same as build_from_file, over in-memory lines.
#[cfg(test)]
pub fn build_from_lines<'a, I>(lines: I, max_size: usize) -> Result<Vocabulary, PipelineError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder = VocabularyBuilder::new(max_size)?;
    for line in lines {
        builder.observe(line);
    }
    Ok(builder.build())
}
