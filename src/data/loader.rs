// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads aligned plain-text files (UTF-8, one pre-tokenised
// sentence per line) into a ParallelCorpus.
//
// Fails fast with CorpusRead when:
//   - either file is missing or unreadable
//   - a line is not valid UTF-8
//   - the two files have different line counts
//
// Windows line endings are tolerated (trailing \r is dropped).

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::domain::corpus::{ParallelCorpus, SentencePair};
use crate::domain::error::PipelineError;

/// Loads a source/target file pair.
pub struct ParallelTextLoader {
    source: PathBuf,
    target: PathBuf,
}

impl ParallelTextLoader {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn load(&self) -> Result<ParallelCorpus, PipelineError> {
        let sources = read_lines(&self.source)?;
        let targets = read_lines(&self.target)?;

        if sources.len() != targets.len() {
            return Err(PipelineError::corpus(
                &self.target,
                format!(
                    "line count mismatch: source '{}' has {} lines, target has {}",
                    self.source.display(),
                    sources.len(),
                    targets.len()
                ),
            ));
        }

        let corpus: ParallelCorpus = sources
            .into_iter()
            .zip(targets)
            .map(|(s, t)| SentencePair::new(s, t))
            .collect();

        tracing::info!(
            "Loaded {} sentence pairs from '{}' / '{}'",
            corpus.len(),
            self.source.display(),
            self.target.display()
        );
        Ok(corpus)
    }
}

/// Open a text file as a lazy line iterator.
pub fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::corpus(path, e))?;
    Ok(Lines::new(BufReader::new(file)))
}

/// Read every line of a text file.
pub fn read_lines(path: &Path) -> Result<Vec<String>, PipelineError> {
    open_lines(path)?
        .map(|line| line.map_err(|e| PipelineError::corpus(path, e)))
        .collect()
}

/// Line iterator that strips a trailing carriage return.
pub struct Lines<R> {
    inner: io::Lines<R>,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R) -> Self {
        Self { inner: reader.lines() }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|line| {
            line.map(|mut l| {
                if l.ends_with('\r') {
                    l.pop();
                }
                l
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempDir;

    #[test]
    fn test_loads_aligned_files() {
        let dir = TempDir::new("loader_aligned");
        let src = dir.write("train.src", "a b c\nd e\n");
        let tgt = dir.write("train.tgt", "x y\r\nz\n");

        let corpus = ParallelTextLoader::new(&src, &tgt).load().unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.pairs()[0], SentencePair::new("a b c", "x y"));
        assert_eq!(corpus.pairs()[1], SentencePair::new("d e", "z"));
    }

    #[test]
    fn test_blank_lines_are_kept() {
        let dir = TempDir::new("loader_blank");
        let src = dir.write("s.txt", "a\n\nb\n");
        let tgt = dir.write("t.txt", "x\n\ny\n");

        let corpus = ParallelTextLoader::new(&src, &tgt).load().unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.pairs()[1], SentencePair::new("", ""));
    }

    #[test]
    fn test_line_count_mismatch_fails_fast() {
        let dir = TempDir::new("loader_mismatch");
        let src = dir.write("s.txt", "a\nb\n");
        let tgt = dir.write("t.txt", "x\n");

        let err = ParallelTextLoader::new(&src, &tgt).load().unwrap_err();
        assert!(matches!(err, PipelineError::CorpusRead { .. }));
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_missing_file_is_corpus_error() {
        let dir = TempDir::new("loader_missing");
        let tgt = dir.write("t.txt", "x\n");
        let err = ParallelTextLoader::new(dir.path().join("nope.txt"), &tgt)
            .load()
            .unwrap_err();
        assert!(matches!(err, PipelineError::CorpusRead { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_corpus_error() {
        let dir = TempDir::new("loader_utf8");
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, [0x61, 0xff, 0xfe, 0x0a]).unwrap();
        assert!(matches!(
            read_lines(&path),
            Err(PipelineError::CorpusRead { .. })
        ));
    }
}
