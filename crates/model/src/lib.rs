//! # quotegen-model — GPT-2 Decoder Graph
//!
//! The computation graph for the pretrained model:
//!
//! * [`CausalSelfAttention`] with a per-layer [`LayerKVCache`] for O(1)
//!   per-token decoding after prefill.
//! * [`Gpt2`] — learned position embeddings, pre-norm blocks, GELU MLP,
//!   weight-tied output projection.
//!
//! Everything goes through `candle-core`/`candle-nn`; the batch dimension is
//! first-class so a replicated prompt batch runs through one graph.

pub mod attention;
pub mod model;

pub use attention::{CausalSelfAttention, LayerKVCache};
pub use model::Gpt2;
