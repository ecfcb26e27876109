//! Decoding parameters → candle sampler.
//!
//! Temperature, top-k and top-p are opaque here; the actual decoding lives
//! in `candle_transformers::generation::LogitsProcessor`. A positive top-p
//! overrides top-k, and top-k 0 means unrestricted.

use candle_transformers::generation::{LogitsProcessor, Sampling};

use quotegen_common::SampleOptions;

/// Map validated options onto a `Sampling` strategy.
pub fn sampling_for(options: &SampleOptions) -> Sampling {
    let temperature = options.temperature;
    if temperature <= 0.0 {
        Sampling::ArgMax
    } else if options.top_p > 0.0 {
        Sampling::TopP {
            p: options.top_p,
            temperature,
        }
    } else if options.top_k > 0 {
        Sampling::TopK {
            k: options.top_k,
            temperature,
        }
    } else {
        Sampling::All { temperature }
    }
}

/// Build the seeded sampler. An absent seed draws one from entropy,
/// giving a nondeterministic run.
pub fn logits_processor(options: &SampleOptions) -> LogitsProcessor {
    let seed = options.seed.unwrap_or_else(rand::random);
    LogitsProcessor::from_sampling(seed, sampling_for(options))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(temperature: f64, top_k: usize, top_p: f64) -> SampleOptions {
        SampleOptions {
            nsamples: 1,
            batch_size: 1,
            length: 8,
            temperature,
            top_k,
            top_p,
            seed: Some(0),
        }
    }

    #[test]
    fn zero_temperature_is_argmax() {
        assert!(matches!(
            sampling_for(&options(0.0, 40, 0.9)),
            Sampling::ArgMax
        ));
    }

    #[test]
    fn unrestricted_when_no_cutoffs() {
        assert!(matches!(
            sampling_for(&options(1.0, 0, 0.0)),
            Sampling::All { .. }
        ));
    }

    #[test]
    fn top_k_when_only_k_set() {
        assert!(matches!(
            sampling_for(&options(1.0, 40, 0.0)),
            Sampling::TopK { k: 40, .. }
        ));
    }

    #[test]
    fn top_p_overrides_top_k() {
        assert!(matches!(
            sampling_for(&options(1.0, 40, 0.9)),
            Sampling::TopP { .. }
        ));
    }
}
