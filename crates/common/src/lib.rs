//! # quotegen-common — Shared Primitives
//!
//! Types shared across every crate in the workspace:
//!
//! * **[`HParams`]** — model hyper-parameters (read from `hparams.json`).
//! * **[`SampleOptions`]** — validated decoding parameters.
//! * **[`Error`]** — the fatal error taxonomy.

pub mod error;
pub mod hparams;
pub mod options;

pub use error::{Error, Result};
pub use hparams::HParams;
pub use options::{RawOptions, SampleOptions};
