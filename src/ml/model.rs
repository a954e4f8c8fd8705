// ============================================================
// Layer 5 — Encoder-Decoder Model (Burn)
// ============================================================
// A compact attention encoder-decoder:
//
//   encoder:  token embedding + learned position embedding
//             → Linear → tanh                [batch, src, d]
//
//   decoder:  previous target token + position (query)
//             → scaled dot-product attention over the
//               encoder memory (source padding masked)
//             → concat(query, context) → Linear → tanh
//             → projection to the target vocabulary
//
// Each decoder position depends only on the previous token,
// its position and the source, so greedy decoding can feed
// one token at a time.
//
// Positions beyond max_positions reuse the last position
// embedding instead of indexing out of range.

use burn::{
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};

use crate::domain::vocabulary::PAD_ID;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    pub d_model:           usize,
    pub max_positions:     usize,
}

impl Seq2SeqConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqModel<B> {
        Seq2SeqModel {
            source_embedding: EmbeddingConfig::new(self.source_vocab_size, self.d_model).init(device),
            source_position:  EmbeddingConfig::new(self.max_positions, self.d_model).init(device),
            encoder:          LinearConfig::new(self.d_model, self.d_model).init(device),
            target_embedding: EmbeddingConfig::new(self.target_vocab_size, self.d_model).init(device),
            target_position:  EmbeddingConfig::new(self.max_positions, self.d_model).init(device),
            combine:          LinearConfig::new(2 * self.d_model, self.d_model).init(device),
            output:           LinearConfig::new(self.d_model, self.target_vocab_size).init(device),
            d_model:          self.d_model,
            max_positions:    self.max_positions,
        }
    }
}

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    pub source_embedding: Embedding<B>,
    pub source_position:  Embedding<B>,
    pub encoder:          Linear<B>,
    pub target_embedding: Embedding<B>,
    pub target_position:  Embedding<B>,
    pub combine:          Linear<B>,
    pub output:           Linear<B>,
    pub d_model:          usize,
    pub max_positions:    usize,
}

impl<B: Backend> Seq2SeqModel<B> {
    /// source: [batch, src_len] → memory: [batch, src_len, d_model]
    pub fn encode(&self, source: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, len] = source.dims();
        let positions = self.positions(batch, len, 0, &source.device());
        let x = self.source_embedding.forward(source) + self.source_position.forward(positions);
        self.encoder.forward(x).tanh()
    }

    /// previous: [batch, tgt_len] tokens fed to the decoder,
    /// starting at absolute position `offset`.
    /// Returns logits: [batch, tgt_len, target_vocab]
    pub fn decode_logits(
        &self,
        memory:         Tensor<B, 3>,
        source_padding: Tensor<B, 2, Bool>,
        previous:       Tensor<B, 2, Int>,
        offset:         usize,
    ) -> Tensor<B, 3> {
        let [batch, tgt_len] = previous.dims();
        let [_, src_len, _] = memory.dims();

        let positions = self.positions(batch, tgt_len, offset, &previous.device());
        let query = self.target_embedding.forward(previous) + self.target_position.forward(positions);

        // [batch, tgt_len, src_len]
        let scores = query
            .clone()
            .matmul(memory.clone().swap_dims(1, 2))
            .div_scalar((self.d_model as f32).sqrt());
        let mask = source_padding
            .unsqueeze_dim::<3>(1)
            .expand([batch, tgt_len, src_len]);
        let weights = softmax(scores.mask_fill(mask, -1.0e9), 2);
        let context = weights.matmul(memory);

        let hidden = self.combine.forward(Tensor::cat(vec![query, context], 2)).tanh();
        self.output.forward(hidden)
    }

    /// Negative log-likelihood of every gold target token with
    /// padding positions zeroed by `target_mask`: [batch, tgt_len]
    pub fn token_nll(
        &self,
        source:        Tensor<B, 2, Int>,
        decoder_input: Tensor<B, 2, Int>,
        target:        Tensor<B, 2, Int>,
        target_mask:   Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let source_padding = source.clone().equal_elem(PAD_ID as i64);
        let memory = self.encode(source);
        let logits = self.decode_logits(memory, source_padding, decoder_input, 0);
        let [batch, len, _] = logits.dims();

        let log_probs = log_softmax(logits, 2);
        let picked = log_probs
            .gather(2, target.unsqueeze_dim::<3>(2))
            .reshape([batch, len]);
        picked.neg().mul(target_mask)
    }

    fn positions(&self, batch: usize, len: usize, offset: usize, device: &B::Device) -> Tensor<B, 2, Int> {
        let last = self.max_positions.saturating_sub(1) as i64;
        Tensor::<B, 1, Int>::arange(offset as i64..(offset + len) as i64, device)
            .clamp_max(last)
            .unsqueeze::<2>()
            .expand([batch, len])
    }
}
