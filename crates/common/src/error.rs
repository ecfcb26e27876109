//! Error taxonomy. Every variant is fatal: errors propagate to `main`
//! and terminate the process with a diagnostic. The one recoverable
//! condition — an empty interactive prompt — never becomes an error;
//! the loop re-prompts instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad decoding parameters (sample/batch ratio, length vs context window).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing or malformed `hparams.json`.
    #[error("failed to load hyper-parameters from {}: {reason}", path.display())]
    ConfigurationLoad { path: PathBuf, reason: String },

    /// No trained parameters available under the model directory.
    #[error("no checkpoint found under {}", .0.display())]
    CheckpointNotFound(PathBuf),

    /// Network or HTTP failure while fetching the prompt in URL mode.
    #[error("failed to fetch prompt from {url}: {reason}")]
    PromptFetch { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
