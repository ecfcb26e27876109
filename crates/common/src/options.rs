//! Decoding parameters: raw values as parsed from the command line, and the
//! validated, immutable form the runtime consumes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hparams::HParams;

/// Unvalidated decoding parameters, straight from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    /// Total number of samples to return.
    pub nsamples: usize,
    /// Rows per sampling round; must divide `nsamples`. `None` means 1.
    pub batch_size: Option<usize>,
    /// Tokens per generated text. `None` means half the context window.
    pub length: Option<usize>,
    /// Boltzmann temperature; values at or below 0 select argmax decoding.
    pub temperature: f64,
    /// Top-k cutoff; 0 means unrestricted.
    pub top_k: usize,
    /// Nucleus sampling threshold in [0, 1]; a positive value overrides top-k.
    pub top_p: f64,
    /// RNG seed; `None` gives a nondeterministic run.
    pub seed: Option<u64>,
}

/// Validated decoding parameters. Constructed once at startup via
/// [`SampleOptions::resolve`] and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOptions {
    pub nsamples: usize,
    pub batch_size: usize,
    pub length: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub seed: Option<u64>,
}

impl SampleOptions {
    /// Validate raw parameters against the model's hyper-parameters.
    ///
    /// * `nsamples` must be a positive multiple of `batch_size`.
    /// * `length` may not exceed the context window; unset defaults to
    ///   `n_ctx / 2` (floor).
    /// * `top_p` must lie in [0, 1].
    pub fn resolve(raw: RawOptions, hparams: &HParams) -> Result<Self> {
        let batch_size = raw.batch_size.unwrap_or(1);
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be positive".into()));
        }
        if raw.nsamples == 0 {
            return Err(Error::InvalidArgument("nsamples must be positive".into()));
        }
        if raw.nsamples % batch_size != 0 {
            return Err(Error::InvalidArgument(format!(
                "nsamples ({}) must be a multiple of batch_size ({batch_size})",
                raw.nsamples
            )));
        }

        let length = match raw.length {
            None => hparams.n_ctx / 2,
            Some(l) if l > hparams.n_ctx => {
                return Err(Error::InvalidArgument(format!(
                    "can't get samples longer than window size: {}",
                    hparams.n_ctx
                )));
            }
            Some(0) => {
                return Err(Error::InvalidArgument("length must be positive".into()));
            }
            Some(l) => l,
        };

        if !(0.0..=1.0).contains(&raw.top_p) {
            return Err(Error::InvalidArgument(format!(
                "top_p must lie in [0, 1], got {}",
                raw.top_p
            )));
        }

        Ok(Self {
            nsamples: raw.nsamples,
            batch_size,
            length,
            temperature: raw.temperature,
            top_k: raw.top_k,
            top_p: raw.top_p,
            seed: raw.seed,
        })
    }

    /// Number of sampling rounds needed to produce all samples.
    pub fn rounds(&self) -> usize {
        self.nsamples / self.batch_size
    }
}
