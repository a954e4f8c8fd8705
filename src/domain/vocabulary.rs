// ============================================================
// Layer 3 — Vocabulary Domain Type
// ============================================================
// An ordered token <-> index mapping. Four reserved symbols
// always occupy the first four indices:
//
//   0  <pad>   padding inside a minibatch
//   1  <unk>   any token outside the bounded vocabulary
//   2  <s>     sequence start (decoder input only)
//   3  </s>    sequence end (appended to every sentence)
//
// Every index in [0, len) names exactly one token.
// Building from a corpus lives in data::vocab_builder,
// persistence in infra::vocab_store.

use std::collections::HashMap;

use crate::domain::error::PipelineError;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const BOS_TOKEN: &str = "<s>";
pub const EOS_TOKEN: &str = "</s>";

pub const PAD_ID: usize = 0;
pub const UNK_ID: usize = 1;
pub const BOS_ID: usize = 2;
pub const EOS_ID: usize = 3;

/// Reserved symbols in index order.
pub const RESERVED_TOKENS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, BOS_TOKEN, EOS_TOKEN];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index:  HashMap<String, usize>,
}

impl Vocabulary {
    /// Vocabulary holding only the reserved symbols.
    pub fn reserved_only() -> Self {
        let tokens: Vec<String> = RESERVED_TOKENS.iter().map(|t| t.to_string()).collect();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, tok)| (tok.clone(), id))
            .collect();
        Self { tokens, index }
    }

    /// Rebuild a vocabulary from tokens in index order.
    ///
    /// The reserved symbols must sit at their fixed indices and
    /// no token may appear twice.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, PipelineError> {
        for (id, reserved) in RESERVED_TOKENS.iter().enumerate() {
            if tokens.get(id).map(String::as_str) != Some(*reserved) {
                return Err(PipelineError::InvalidConfig(format!(
                    "vocabulary index {id} must hold reserved symbol {reserved}"
                )));
            }
        }

        let mut index = HashMap::with_capacity(tokens.len());
        for (id, tok) in tokens.iter().enumerate() {
            if index.insert(tok.clone(), id).is_some() {
                return Err(PipelineError::InvalidConfig(format!(
                    "vocabulary token '{tok}' appears more than once"
                )));
            }
        }
        Ok(Self { tokens, index })
    }

    /// Append a token unless it is already present.
    pub(crate) fn push(&mut self, token: &str) {
        if !self.index.contains_key(token) {
            self.index.insert(token.to_string(), self.tokens.len());
            self.tokens.push(token.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Index for a token; unknown tokens map to <unk>.
    pub fn id(&self, token: &str) -> usize {
        self.index.get(token).copied().unwrap_or(UNK_ID)
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.tokens.get(id).map(String::as_str)
    }

    /// Whitespace-split a pre-tokenised line, map to indices and append </s>.
    pub fn encode(&self, line: &str) -> Vec<usize> {
        let mut ids: Vec<usize> = line.split_whitespace().map(|t| self.id(t)).collect();
        ids.push(EOS_ID);
        ids
    }

    /// Number of tokens in `line` that fall outside this vocabulary.
    pub fn count_unknown(&self, line: &str) -> usize {
        line.split_whitespace().filter(|t| !self.contains(t)).count()
    }

    /// Turn indices back into whitespace-joined text.
    /// Stops at the first </s>; <pad> and <s> are dropped.
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter()
            .take_while(|&&id| id != EOS_ID)
            .filter(|&&id| id != PAD_ID && id != BOS_ID)
            .map(|&id| self.token(id).unwrap_or(UNK_TOKEN))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vocabulary {
        let mut v = Vocabulary::reserved_only();
        v.push("hello");
        v.push("world");
        v
    }

    #[test]
    fn test_reserved_indices_are_fixed() {
        let v = Vocabulary::reserved_only();
        assert_eq!(v.len(), 4);
        assert_eq!(v.id(PAD_TOKEN), PAD_ID);
        assert_eq!(v.id(UNK_TOKEN), UNK_ID);
        assert_eq!(v.id(BOS_TOKEN), BOS_ID);
        assert_eq!(v.id(EOS_TOKEN), EOS_ID);
    }

    #[test]
    fn test_encode_maps_unknown_and_appends_eos() {
        let v = sample();
        assert_eq!(v.encode("hello there world"), vec![4, UNK_ID, 5, EOS_ID]);
        assert_eq!(v.encode(""), vec![EOS_ID]);
        assert_eq!(v.count_unknown("hello there you"), 2);
    }

    #[test]
    fn test_decode_stops_at_eos_and_skips_padding() {
        let v = sample();
        assert_eq!(v.decode(&[BOS_ID, 4, PAD_ID, 5, EOS_ID, 4]), "hello world");
        assert_eq!(v.decode(&[EOS_ID]), "");
        assert_eq!(v.decode(&[4, 99]), "hello <unk>");
    }

    #[test]
    fn test_from_tokens_rejects_misplaced_reserved() {
        let bad = vec!["<unk>".to_string(), "<pad>".to_string(), "<s>".to_string(), "</s>".to_string()];
        assert!(Vocabulary::from_tokens(bad).is_err());

        let dup: Vec<String> = RESERVED_TOKENS
            .iter()
            .map(|t| t.to_string())
            .chain(["a".to_string(), "a".to_string()])
            .collect();
        assert!(Vocabulary::from_tokens(dup).is_err());
    }

    #[test]
    fn test_from_tokens_round_trips() {
        let v = sample();
        let rebuilt = Vocabulary::from_tokens(v.tokens().to_vec()).unwrap();
        assert_eq!(rebuilt, v);
    }
}
