//! # quotegen-infer — Inference Runtime
//!
//! * **[`InferenceRuntime`]** — load hparams, tokenizer and the latest
//!   checkpoint once; run batched multi-round sampling.
//! * **[`sampler`]** — decoding parameters → `LogitsProcessor`.
//! * **[`find_quotes`]** — the quotation post-filter.

pub mod quotes;
pub mod runtime;
pub mod sampler;

pub use quotes::{find_quotes, DEFAULT_AUTHOR};
pub use runtime::InferenceRuntime;
pub use sampler::logits_processor;
