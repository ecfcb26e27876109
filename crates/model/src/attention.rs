//! Causal self-attention with a fused Q/K/V projection.
//!
//! Two paths:
//! * **Prefill** — full sequence with a causal mask; fills the KV cache.
//! * **Decode** — one token per step, attending over the cached keys and
//!   values only (no mask needed: the cache holds exactly the past).

use candle_core::{DType, Device, Error, IndexOp, Result, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

use quotegen_common::HParams;

/// Per-layer KV cache for incremental decoding.
///
/// Stores key and value tensors of shape `(batch, n_head, seq_len, head_dim)`.
/// Empty until prefill; extended by one position each decode step.
#[derive(Default)]
pub struct LayerKVCache {
    key: Option<Tensor>,
    value: Option<Tensor>,
}

impl LayerKVCache {
    /// Number of positions currently cached (0 if empty).
    pub fn len(&self) -> usize {
        self.key
            .as_ref()
            .map(|t| t.dim(2).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append keys and values along the sequence axis.
    pub fn append(&mut self, k: Tensor, v: Tensor) -> Result<()> {
        self.key = Some(match self.key.take() {
            None => k,
            Some(key) => Tensor::cat(&[&key, &k], 2)?,
        });
        self.value = Some(match self.value.take() {
            None => v,
            Some(value) => Tensor::cat(&[&value, &v], 2)?,
        });
        Ok(())
    }

    /// Cached keys: `(batch, n_head, seq_len, head_dim)`. `None` if empty.
    pub fn key(&self) -> Option<&Tensor> {
        self.key.as_ref()
    }

    /// Cached values: `(batch, n_head, seq_len, head_dim)`. `None` if empty.
    pub fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    /// Clear the cache for a new sequence.
    pub fn clear(&mut self) {
        self.key = None;
        self.value = None;
    }
}

/// Additive causal mask: 0 on and below the diagonal, -1e9 above.
/// Shape `(1, 1, t, t)` for broadcasting over batch and heads.
fn causal_mask(t: usize, device: &Device) -> Result<Tensor> {
    let tril = Tensor::tril2(t, DType::F32, device)?;
    let ones = Tensor::ones((t, t), DType::F32, device)?;
    ((ones - tril)? * -1e9f64)?.reshape((1, 1, t, t))
}

/// Multi-head causal self-attention (GPT-2 layout: fused `c_attn`, `c_proj`).
pub struct CausalSelfAttention {
    c_attn: Linear,
    c_proj: Linear,
    n_head: usize,
    head_dim: usize,
    scale: f64,
}

impl CausalSelfAttention {
    pub fn new(hparams: &HParams, vb: VarBuilder) -> Result<Self> {
        let n_embd = hparams.n_embd;
        let head_dim = hparams.head_dim();

        let c_attn = linear(n_embd, 3 * n_embd, vb.pp("c_attn"))?;
        let c_proj = linear(n_embd, n_embd, vb.pp("c_proj"))?;

        Ok(Self {
            c_attn,
            c_proj,
            n_head: hparams.n_head,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    /// Split the fused QKV projection into per-head Q, K, V of shape
    /// `(b, n_head, t, head_dim)`.
    fn split_qkv(&self, x: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let (b, t, _c) = x.dims3()?;
        let qkv = self.c_attn.forward(x)?;
        let qkv = qkv.reshape((b, t, 3, self.n_head, self.head_dim))?;
        let qkv = qkv.permute((0, 3, 1, 4, 2))?; // (b, heads, t, head_dim, 3)

        let q = qkv.i((.., .., .., .., 0))?.contiguous()?;
        let k = qkv.i((.., .., .., .., 1))?.contiguous()?;
        let v = qkv.i((.., .., .., .., 2))?.contiguous()?;
        Ok((q, k, v))
    }

    /// Forward with an optional KV cache.
    ///
    /// * `cache == None` — plain full-sequence attention.
    /// * cache empty — prefill: full causal attention, cache filled.
    /// * cache non-empty — decode step: `x` must hold a single position.
    pub fn forward(&self, x: &Tensor, cache: Option<&mut LayerKVCache>) -> Result<Tensor> {
        let (b, t, c) = x.dims3()?;
        let (q, k, v) = self.split_qkv(x)?;

        let y = match cache {
            Some(cache) if !cache.is_empty() => {
                if t != 1 {
                    return Err(Error::Msg(format!(
                        "decode step expects seq_len 1, got {t}"
                    )));
                }
                cache.append(k, v)?;
                let key = cache.key().unwrap();
                let value = cache.value().unwrap();

                let scores = (q.matmul(&key.t()?)? * self.scale)?;
                let att = candle_nn::ops::softmax(&scores, D::Minus1)?;
                att.contiguous()?.matmul(value)?
            }
            cache => {
                if let Some(cache) = cache {
                    cache.append(k.clone(), v.clone())?;
                }
                let scores = (q.matmul(&k.t()?)? * self.scale)?;
                let scores = scores.broadcast_add(&causal_mask(t, x.device())?)?;
                let att = candle_nn::ops::softmax(&scores, D::Minus1)?;
                att.contiguous()?.matmul(&v)?
            }
        };

        // (b, heads, t, head_dim) -> (b, t, c)
        let y = y.transpose(1, 2)?.reshape((b, t, c))?;
        self.c_proj.forward(&y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::{VarBuilder, VarMap};

    fn tiny() -> HParams {
        HParams {
            n_vocab: 16,
            n_ctx: 16,
            n_embd: 8,
            n_head: 2,
            n_layer: 1,
        }
    }

    fn build() -> CausalSelfAttention {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        CausalSelfAttention::new(&tiny(), vb).unwrap()
    }

    #[test]
    fn output_shape_matches_input() {
        let attn = build();
        let x = Tensor::zeros((2, 5, 8), DType::F32, &Device::Cpu).unwrap();
        let y = attn.forward(&x, None).unwrap();
        assert_eq!(y.dims3().unwrap(), (2, 5, 8));
    }

    #[test]
    fn cache_grows_by_one_per_decode_step() {
        let attn = build();
        let mut cache = LayerKVCache::default();
        assert!(cache.is_empty());

        let x = Tensor::zeros((1, 3, 8), DType::F32, &Device::Cpu).unwrap();
        attn.forward(&x, Some(&mut cache)).unwrap();
        assert_eq!(cache.len(), 3);

        let x = Tensor::zeros((1, 1, 8), DType::F32, &Device::Cpu).unwrap();
        attn.forward(&x, Some(&mut cache)).unwrap();
        assert_eq!(cache.len(), 4);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn decode_step_rejects_multiple_positions() {
        let attn = build();
        let mut cache = LayerKVCache::default();
        let x = Tensor::zeros((1, 2, 8), DType::F32, &Device::Cpu).unwrap();
        attn.forward(&x, Some(&mut cache)).unwrap();
        // Cache is non-empty now, so a 2-token input must fail.
        let x = Tensor::zeros((1, 2, 8), DType::F32, &Device::Cpu).unwrap();
        assert!(attn.forward(&x, Some(&mut cache)).is_err());
    }
}
