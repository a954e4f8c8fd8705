// ============================================================
// Layer 5 — Translator
// ============================================================
// Streams translations: one output line per input line, in
// input order, blank lines included (a blank line decodes
// from "</s>" alone and yields whatever the model produces,
// often an empty line).
//
// Input is pulled through the Batcher one batch at a time and
// output is flushed after every batch, so memory stays
// bounded by batch_size regardless of input length.

use std::io::{BufRead, Write};
use std::path::Path;

use crate::data::{batcher::Batcher, loader::Lines};
use crate::domain::error::PipelineError;
use crate::domain::traits::ModelRuntime;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::CheckpointStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslationStats {
    pub lines:          usize,
    /// Source tokens mapped to <unk>
    pub unknown_tokens: usize,
}

pub struct Translator<R: ModelRuntime> {
    runtime:           R,
    source_vocab:      Vocabulary,
    target_vocab:      Vocabulary,
    max_output_length: usize,
}

impl<R: ModelRuntime> Translator<R> {
    pub fn new(
        runtime:           R,
        source_vocab:      Vocabulary,
        target_vocab:      Vocabulary,
        max_output_length: usize,
    ) -> Self {
        Self { runtime, source_vocab, target_vocab, max_output_length }
    }

    pub fn from_checkpoint(dir: &Path, max_output_length: usize) -> Result<Self, PipelineError> {
        let (runtime, checkpoint) = CheckpointStore::new(dir).restore::<R>()?;
        tracing::info!("Translating with checkpoint from epoch {}", checkpoint.manifest.epoch);
        Ok(Self::new(
            runtime,
            checkpoint.source_vocab,
            checkpoint.target_vocab,
            max_output_length,
        ))
    }

    fn translate_ids(&self, source: &[usize]) -> Result<String, PipelineError> {
        let output = self.runtime.decode(source, self.max_output_length)?;
        Ok(self.target_vocab.decode(&output))
    }

    /// Translate every line of `input` into `output`.
    pub fn translate_stream<I: BufRead, O: Write>(
        &self,
        input:      I,
        mut output: O,
        batch_size: usize,
    ) -> Result<TranslationStats, PipelineError> {
        let batcher = Batcher::new(batch_size)?;
        let mut batches = batcher.monolingual(&self.source_vocab, Lines::new(input));

        let mut lines = 0usize;
        for batch in batches.by_ref() {
            let batch = batch?;
            for row in 0..batch.len() {
                let translation = self.translate_ids(batch.source_row(row))?;
                writeln!(output, "{translation}").map_err(PipelineError::OutputWrite)?;
            }
            output.flush().map_err(PipelineError::OutputWrite)?;
            lines += batch.len();
            tracing::debug!("Translated {lines} line(s)");
        }

        if let Some(mismatch) = batches.vocabulary_mismatch() {
            tracing::warn!("{mismatch}");
        }

        Ok(TranslationStats {
            lines,
            unknown_tokens: batches.unknown_tokens(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::data::vocab_builder::build_from_lines;
    use crate::domain::training::ModelHyperparameters;
    use crate::test_support::{ScriptedRuntime, TempDir};

    // Shared vocabulary, so the scripted echo decodes to the source words
    fn translator() -> Translator<ScriptedRuntime> {
        let vocab = build_from_lines(["hello world", "good morning"], 20).unwrap();
        let runtime = ScriptedRuntime::initialize(vocab.len(), vocab.len(), &ModelHyperparameters::default()).unwrap();
        Translator::new(runtime, vocab.clone(), vocab, 50)
    }

    fn translate(translator: &Translator<ScriptedRuntime>, input: &str) -> String {
        let mut out = Vec::new();
        translator.translate_stream(Cursor::new(input), &mut out, 4).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_translate_single_lines() {
        assert_eq!(translate(&translator(), "hello world\n"), "hello world\n");
        assert_eq!(translate(&translator(), "hello mars\n"), "hello <unk>\n");
    }

    #[test]
    fn test_stream_preserves_line_count_and_order() {
        let input = "hello world\n\ngood morning\nworld\n\n";
        let mut out = Vec::new();
        let stats = translator().translate_stream(Cursor::new(input), &mut out, 2).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(stats.lines, 5);
        assert_eq!(lines, vec!["hello world", "", "good morning", "world", ""]);
    }

    #[test]
    fn test_stream_counts_unknown_tokens() {
        let mut out = Vec::new();
        let stats = translator()
            .translate_stream(Cursor::new("hello there friend\n"), &mut out, 8)
            .unwrap();
        assert_eq!(stats, TranslationStats { lines: 1, unknown_tokens: 2 });
    }

    #[test]
    fn test_max_output_length_is_respected() {
        let vocab = build_from_lines(["a b c d e"], 20).unwrap();
        let runtime = ScriptedRuntime::initialize(vocab.len(), vocab.len(), &ModelHyperparameters::default()).unwrap();
        let translator = Translator::new(runtime, vocab.clone(), vocab, 2);
        assert_eq!(translate(&translator, "a b c d e\n"), "a b\n");
    }

    #[test]
    fn test_decode_failure_is_fatal() {
        let mut t = translator();
        t.runtime.fail_decode = true;
        let mut out = Vec::new();
        assert!(matches!(
            t.translate_stream(Cursor::new("hello\n"), &mut out, 1),
            Err(PipelineError::ModelRuntime(_))
        ));
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir = TempDir::new("translator_missing");
        assert!(matches!(
            Translator::<ScriptedRuntime>::from_checkpoint(dir.path(), 10),
            Err(PipelineError::CheckpointNotFound { .. })
        ));
    }
}
