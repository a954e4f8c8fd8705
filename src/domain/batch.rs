// ============================================================
// Layer 3 — Minibatch Domain Type
// ============================================================
// A group of index-encoded sentences padded to the longest
// sentence in the batch (not a global maximum).
//
//   source:          [rows][source_width]   padded with <pad>
//   source_lengths:  true lengths incl. </s>
//   target (opt.):   same layout plus a 1.0/0.0 loss mask
//
// Translation batches carry no target side.

use crate::domain::vocabulary::PAD_ID;

#[derive(Debug, Clone, PartialEq)]
pub struct TargetSide {
    pub tokens:  Vec<Vec<usize>>,
    pub lengths: Vec<usize>,
    /// 1.0 on real positions, 0.0 on padding
    pub mask:    Vec<Vec<f32>>,
}

impl TargetSide {
    pub fn token_count(&self) -> usize {
        self.lengths.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Minibatch {
    /// Position of each row in the originating corpus or stream
    pub indices:        Vec<usize>,
    pub source:         Vec<Vec<usize>>,
    pub source_lengths: Vec<usize>,
    pub target:         Option<TargetSide>,
}

impl Minibatch {
    /// Pad already-encoded sequences into a batch.
    pub fn from_sequences(
        indices: Vec<usize>,
        source:  Vec<Vec<usize>>,
        target:  Option<Vec<Vec<usize>>>,
    ) -> Self {
        let (source, source_lengths) = pad(source);
        let target = target.map(|rows| {
            let (tokens, lengths) = pad(rows);
            let mask = tokens
                .iter()
                .zip(&lengths)
                .map(|(row, &len)| {
                    (0..row.len()).map(|i| if i < len { 1.0 } else { 0.0 }).collect()
                })
                .collect();
            TargetSide { tokens, lengths, mask }
        });
        Self { indices, source, source_lengths, target }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Source row without padding.
    pub fn source_row(&self, row: usize) -> &[usize] {
        &self.source[row][..self.source_lengths[row]]
    }
}

fn pad(rows: Vec<Vec<usize>>) -> (Vec<Vec<usize>>, Vec<usize>) {
    let lengths: Vec<usize> = rows.iter().map(Vec::len).collect();
    let width = lengths.iter().copied().max().unwrap_or(0);
    let padded = rows
        .into_iter()
        .map(|mut row| {
            row.resize(width, PAD_ID);
            row
        })
        .collect();
    (padded, lengths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pads_to_longest_row_in_batch() {
        let batch = Minibatch::from_sequences(
            vec![0, 1],
            vec![vec![4, 5, 6, 3], vec![7, 3]],
            Some(vec![vec![8, 3], vec![9, 10, 11, 12, 3]]),
        );
        assert!(batch.source.iter().all(|row| row.len() == 4));
        assert_eq!(batch.source[1], vec![7, 3, PAD_ID, PAD_ID]);
        assert_eq!(batch.source_lengths, vec![4, 2]);

        let target = batch.target.as_ref().unwrap();
        assert!(target.tokens.iter().all(|row| row.len() == 5));
        assert_eq!(target.mask[0], vec![1.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(target.token_count(), 7);
        assert_eq!(target.tokens[0], vec![8, 3, PAD_ID, PAD_ID, PAD_ID]);
    }

    #[test]
    fn test_source_only_batch() {
        let batch = Minibatch::from_sequences(vec![3], vec![vec![3]], None);
        assert_eq!(batch.len(), 1);
        assert!(batch.target.is_none());
        assert_eq!(batch.source_row(0), &[3]);
    }
}
