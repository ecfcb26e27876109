//! GPT-2 decoder graph.
//!
//! Learned position embeddings (`wpe`), pre-norm blocks
//! (ln_1 → attention → residual, ln_2 → GELU MLP → residual), final `ln_f`.
//! Weight tying: the token embedding `wte` and the output projection share
//! the same matrix; no separate `lm_head` is stored.

use candle_core::{Result, Tensor};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, Module, VarBuilder};

use quotegen_common::HParams;

use crate::attention::{CausalSelfAttention, LayerKVCache};

const LAYER_NORM_EPS: f64 = 1e-5;

// ── MLP ─────────────────────────────────────────────────────────────────────

/// 2-projection FFN with GELU: `c_proj(gelu(c_fc(x)))`, expansion factor 4.
struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
}

impl Mlp {
    fn new(hparams: &HParams, vb: VarBuilder) -> Result<Self> {
        let n_embd = hparams.n_embd;
        let c_fc = linear(n_embd, 4 * n_embd, vb.pp("c_fc"))?;
        let c_proj = linear(4 * n_embd, n_embd, vb.pp("c_proj"))?;
        Ok(Self { c_fc, c_proj })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.c_proj.forward(&self.c_fc.forward(x)?.gelu()?)
    }
}

// ── Decoder Block ───────────────────────────────────────────────────────────

/// Single decoder block: pre-norm → attention → residual → pre-norm → MLP → residual.
struct Block {
    ln_1: LayerNorm,
    attn: CausalSelfAttention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn new(hparams: &HParams, vb: VarBuilder) -> Result<Self> {
        let ln_1 = layer_norm(hparams.n_embd, LAYER_NORM_EPS, vb.pp("ln_1"))?;
        let attn = CausalSelfAttention::new(hparams, vb.pp("attn"))?;
        let ln_2 = layer_norm(hparams.n_embd, LAYER_NORM_EPS, vb.pp("ln_2"))?;
        let mlp = Mlp::new(hparams, vb.pp("mlp"))?;
        Ok(Self {
            ln_1,
            attn,
            ln_2,
            mlp,
        })
    }

    fn forward(&self, x: &Tensor, cache: Option<&mut LayerKVCache>) -> Result<Tensor> {
        let attn_out = self.attn.forward(&self.ln_1.forward(x)?, cache)?;
        let x = (x + attn_out)?;
        let mlp_out = self.mlp.forward(&self.ln_2.forward(&x)?)?;
        x + mlp_out
    }
}

// ── Gpt2 ────────────────────────────────────────────────────────────────────

/// Decoder-only transformer over a `(batch, seq)` token tensor.
pub struct Gpt2 {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    hparams: HParams,
}

impl Gpt2 {
    /// Build the graph once; weights come from the checkpoint via `VarMap`.
    pub fn new(vb: VarBuilder, hparams: &HParams) -> Result<Self> {
        let wte = embedding(hparams.n_vocab, hparams.n_embd, vb.pp("wte"))?;
        let wpe = embedding(hparams.n_ctx, hparams.n_embd, vb.pp("wpe"))?;

        let mut blocks = Vec::with_capacity(hparams.n_layer);
        for i in 0..hparams.n_layer {
            blocks.push(Block::new(hparams, vb.pp(format!("h.{i}")))?);
        }

        let ln_f = layer_norm(hparams.n_embd, LAYER_NORM_EPS, vb.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            hparams: hparams.clone(),
        })
    }

    pub fn hparams(&self) -> &HParams {
        &self.hparams
    }

    /// Full-sequence forward pass (no cache).
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        self.forward_with_cache(input_ids, None)
    }

    /// Forward pass over `(batch, seq)` token ids, yielding
    /// `(batch, seq, n_vocab)` logits.
    ///
    /// With a cache, position embeddings are offset by the number of
    /// positions already cached, so prefill and decode steps see the same
    /// positions a full forward pass would.
    pub fn forward_with_cache(
        &self,
        input_ids: &Tensor,
        mut cache: Option<&mut [LayerKVCache]>,
    ) -> Result<Tensor> {
        let (b, t) = input_ids.dims2()?;
        let past = cache
            .as_deref()
            .and_then(|c| c.first())
            .map_or(0, |layer| layer.len());

        let positions =
            Tensor::arange(past as u32, (past + t) as u32, input_ids.device())?;
        let mut x = self
            .wte
            .forward(input_ids)?
            .broadcast_add(&self.wpe.forward(&positions)?)?;

        for (i, block) in self.blocks.iter().enumerate() {
            let layer_cache = cache.as_deref_mut().map(|c| &mut c[i]);
            x = block.forward(&x, layer_cache)?;
        }
        let x = self.ln_f.forward(&x)?;

        // Weight-tied output projection: logits = x @ wte^T
        let wte_weight = self.wte.embeddings();
        let x_2d = x.reshape((b * t, self.hparams.n_embd))?;
        let logits = x_2d.matmul(&wte_weight.t()?)?;
        logits.reshape((b, t, self.hparams.n_vocab))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, IndexOp};
    use candle_nn::{VarBuilder, VarMap};

    fn tiny() -> HParams {
        HParams {
            n_vocab: 16,
            n_ctx: 16,
            n_embd: 8,
            n_head: 2,
            n_layer: 2,
        }
    }

    fn build(hparams: &HParams) -> Gpt2 {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        Gpt2::new(vb, hparams).unwrap()
    }

    #[test]
    fn logits_shape() {
        let hparams = tiny();
        let model = build(&hparams);
        let ids = Tensor::zeros((2, 4), DType::U32, &Device::Cpu).unwrap();
        let logits = model.forward(&ids).unwrap();
        assert_eq!(logits.dims3().unwrap(), (2, 4, 16));
    }

    #[test]
    fn cached_decode_matches_full_forward() {
        let hparams = tiny();
        let model = build(&hparams);
        let device = Device::Cpu;

        let full_ids = Tensor::new(&[[1u32, 5, 2, 7]], &device).unwrap();
        let full_logits = model.forward(&full_ids).unwrap();
        let expected: Vec<f32> = full_logits.i((0, 3)).unwrap().to_vec1().unwrap();

        let mut cache: Vec<LayerKVCache> = Vec::new();
        cache.resize_with(hparams.n_layer, LayerKVCache::default);

        let prefix = Tensor::new(&[[1u32, 5, 2]], &device).unwrap();
        model
            .forward_with_cache(&prefix, Some(cache.as_mut_slice()))
            .unwrap();
        let step = Tensor::new(&[[7u32]], &device).unwrap();
        let logits = model
            .forward_with_cache(&step, Some(cache.as_mut_slice()))
            .unwrap();
        let got: Vec<f32> = logits.i((0, 0)).unwrap().to_vec1().unwrap();

        let max_diff = expected
            .iter()
            .zip(&got)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 1e-4, "max diff {max_diff}");
    }

    #[test]
    fn batch_rows_are_independent() {
        let hparams = tiny();
        let model = build(&hparams);
        let device = Device::Cpu;

        let single = Tensor::new(&[[3u32, 9, 1]], &device).unwrap();
        let single_logits = model.forward(&single).unwrap();
        let expected: Vec<f32> = single_logits.i((0, 2)).unwrap().to_vec1().unwrap();

        let batch = Tensor::new(&[[3u32, 9, 1], [8u32, 2, 4]], &device).unwrap();
        let batch_logits = model.forward(&batch).unwrap();
        let got: Vec<f32> = batch_logits.i((0, 2)).unwrap().to_vec1().unwrap();

        let max_diff = expected
            .iter()
            .zip(&got)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 1e-4, "max diff {max_diff}");
    }
}
