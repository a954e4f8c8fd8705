// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Vocabularies are persisted as HuggingFace tokenizer JSON
// with a WordLevel model, so the files in a checkpoint can be
// opened by any tokenizers-compatible tool.
//
//   pre_tokenizer: WhitespaceSplit (no punctuation splitting —
//                  input is already tokenised)
//   normalizer:    none (case is preserved)
//   added_tokens:  the four reserved symbols, marked special
//
// Loading goes back through tokenizers::Tokenizer and then
// checks that ids are contiguous and the reserved symbols sit
// at their fixed indices.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};
use tokenizers::Tokenizer;

use crate::domain::error::PipelineError;
use crate::domain::traits::Persistable;
use crate::domain::vocabulary::{Vocabulary, RESERVED_TOKENS, UNK_TOKEN};

/// Tokenizer JSON document for a vocabulary.
pub fn to_tokenizer_json(vocab: &Vocabulary) -> Value {
    let mut entries = Map::new();
    for (id, token) in vocab.tokens().iter().enumerate() {
        entries.insert(token.clone(), json!(id));
    }

    let added_tokens: Vec<Value> = RESERVED_TOKENS
        .iter()
        .enumerate()
        .map(|(id, content)| {
            json!({
                "id": id,
                "content": content,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": Value::Object(entries),
            "unk_token": UNK_TOKEN
        }
    })
}

/// Rebuild a Vocabulary from a loaded tokenizer.
pub fn from_tokenizer(tokenizer: &Tokenizer, path: &Path) -> Result<Vocabulary, PipelineError> {
    let mut entries: Vec<(String, u32)> = tokenizer.get_vocab(true).into_iter().collect();
    entries.sort_by_key(|(_, id)| *id);

    for (expected, (token, id)) in entries.iter().enumerate() {
        if *id as usize != expected {
            return Err(PipelineError::missing_checkpoint(
                path,
                format!("vocabulary ids are not contiguous at '{token}' (id {id})"),
            ));
        }
    }

    let tokens = entries.into_iter().map(|(token, _)| token).collect();
    Vocabulary::from_tokens(tokens).map_err(|e| PipelineError::missing_checkpoint(path, e))
}

impl Persistable for Vocabulary {
    fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(&to_tokenizer_json(self))
            .map_err(|e| PipelineError::checkpoint_write(path, e))?;
        fs::write(path, json).map_err(|e| PipelineError::checkpoint_write(path, e))?;
        tracing::debug!("Saved vocabulary ({} entries) to '{}'", self.len(), path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::missing_checkpoint(path, "vocabulary file not found"));
        }
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| PipelineError::missing_checkpoint(path, format!("cannot parse vocabulary: {e}")))?;
        let vocab = from_tokenizer(&tokenizer, path)?;
        tracing::debug!("Loaded vocabulary ({} entries) from '{}'", vocab.len(), path.display());
        Ok(vocab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab_builder::build_from_lines;
    use crate::domain::vocabulary::UNK_ID;
    use crate::test_support::TempDir;

    #[test]
    fn test_save_then_load_preserves_order() {
        let dir = TempDir::new("vocab_store_roundtrip");
        let vocab = build_from_lines(["Zebra apple , apple", "don't stop"], 20).unwrap();
        let path = dir.path().join("vocab.json");

        vocab.save(&path).unwrap();
        let loaded = Vocabulary::load(&path).unwrap();
        assert_eq!(loaded, vocab);
    }

    #[test]
    fn test_saved_file_is_a_working_tokenizer() {
        let dir = TempDir::new("vocab_store_tokenizer");
        let vocab = build_from_lines(["the cat's hat"], 20).unwrap();
        let path = dir.path().join("vocab.json");
        vocab.save(&path).unwrap();

        let tokenizer = Tokenizer::from_file(&path).unwrap();
        let encoding = tokenizer.encode("the cat's mat", false).unwrap();
        let ids: Vec<usize> = encoding.get_ids().iter().map(|&id| id as usize).collect();
        assert_eq!(ids, vec![vocab.id("the"), vocab.id("cat's"), UNK_ID]);
    }

    #[test]
    fn test_missing_file_is_checkpoint_not_found() {
        let dir = TempDir::new("vocab_store_missing");
        assert!(matches!(
            Vocabulary::load(&dir.path().join("nope.json")),
            Err(PipelineError::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn test_garbage_file_is_checkpoint_not_found() {
        let dir = TempDir::new("vocab_store_garbage");
        let path = dir.write("vocab.json", "{ not json");
        assert!(matches!(
            Vocabulary::load(&path),
            Err(PipelineError::CheckpointNotFound { .. })
        ));
    }
}
