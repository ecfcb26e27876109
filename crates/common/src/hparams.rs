//! Model hyper-parameters, read from `models/<name>/hparams.json`.
//!
//! Every field carries the GPT-2 117M default, so a partial JSON document
//! overrides only the fields it names (the rest fall back to the defaults).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hyper-parameters of the pretrained decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HParams {
    /// Vocabulary size (must match the tokenizer).
    #[serde(default = "default_n_vocab")]
    pub n_vocab: usize,
    /// Context window: maximum number of tokens the model considers at once.
    #[serde(default = "default_n_ctx")]
    pub n_ctx: usize,
    /// Hidden size (model dimension).
    #[serde(default = "default_n_embd")]
    pub n_embd: usize,
    /// Number of attention heads.
    #[serde(default = "default_n_head")]
    pub n_head: usize,
    /// Number of decoder layers.
    #[serde(default = "default_n_layer")]
    pub n_layer: usize,
}

fn default_n_vocab() -> usize {
    50257
}
fn default_n_ctx() -> usize {
    1024
}
fn default_n_embd() -> usize {
    768
}
fn default_n_head() -> usize {
    12
}
fn default_n_layer() -> usize {
    12
}

impl Default for HParams {
    fn default() -> Self {
        Self {
            n_vocab: default_n_vocab(),
            n_ctx: default_n_ctx(),
            n_embd: default_n_embd(),
            n_head: default_n_head(),
            n_layer: default_n_layer(),
        }
    }
}

impl HParams {
    /// Load hyper-parameters from a JSON file. Missing fields fall back to
    /// the 117M defaults; a missing or malformed file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::ConfigurationLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&json).map_err(|e| Error::ConfigurationLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Head dimension (`n_embd / n_head`). Panics if not divisible.
    pub fn head_dim(&self) -> usize {
        assert!(
            self.n_embd % self.n_head == 0,
            "n_embd ({}) must be divisible by n_head ({})",
            self.n_embd,
            self.n_head,
        );
        self.n_embd / self.n_head
    }
}
