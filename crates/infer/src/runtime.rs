//! Inference runtime: load model resources once, then serve sampling
//! requests from the interaction loop.
//!
//! The graph is built exactly once per process; trained parameters are
//! restored from the most recently modified safetensors checkpoint under
//! `models/<name>/`.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::generation::LogitsProcessor;
use tokenizers::Tokenizer;

use quotegen_common::{Error, HParams, RawOptions, SampleOptions};
use quotegen_model::{Gpt2, LayerKVCache};

use crate::quotes::find_quotes;
use crate::sampler::logits_processor;

/// Long-lived compute context: graph, restored weights, tokenizer and the
/// seeded sampler, reused across every prompt of the session.
pub struct InferenceRuntime {
    model: Gpt2,
    #[allow(dead_code)]
    varmap: VarMap,
    tokenizer: Tokenizer,
    sampler: LogitsProcessor,
    options: SampleOptions,
    device: Device,
}

impl std::fmt::Debug for InferenceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceRuntime").finish_non_exhaustive()
    }
}

impl InferenceRuntime {
    /// Load everything under `models_root/<model_name>/`.
    ///
    /// Order matters for error reporting: hyper-parameters and option
    /// validation come first, so argument errors surface before any model
    /// resources are touched.
    pub fn load(
        models_root: &Path,
        model_name: &str,
        raw: RawOptions,
        device: Device,
    ) -> anyhow::Result<Self> {
        let model_dir = models_root.join(model_name);

        let hparams = HParams::load(&model_dir.join("hparams.json"))?;
        let options = SampleOptions::resolve(raw, &hparams)?;

        let tokenizer =
            Tokenizer::from_file(model_dir.join("tokenizer.json")).map_err(anyhow::Error::msg)?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Gpt2::new(vb, &hparams)?;

        let checkpoint = latest_checkpoint(&model_dir)?;
        tracing::info!(checkpoint = %checkpoint.display(), "restoring parameters");
        varmap.load(&checkpoint)?;

        let sampler = logits_processor(&options);

        Ok(Self {
            model,
            varmap,
            tokenizer,
            sampler,
            options,
            device,
        })
    }

    pub fn options(&self) -> &SampleOptions {
        &self.options
    }

    /// Generation-and-filter step: sample `nsamples` continuations of the
    /// prompt and return the segments the quote filter retains, in
    /// generation order.
    pub fn sample_quotes(&mut self, prompt: &str, author: &str) -> anyhow::Result<Vec<String>> {
        let texts = self.sample_batches(prompt)?;
        Ok(texts
            .iter()
            .flat_map(|text| find_quotes(text, author))
            .map(str::to_owned)
            .collect())
    }

    /// Tokenize the prompt once, then run `nsamples / batch_size` sampling
    /// rounds. Every round's batch is decoded and accumulated, so exactly
    /// `nsamples` texts come back. The echoed prompt prefix is never part
    /// of the output: only newly sampled tokens are decoded.
    pub fn sample_batches(&mut self, prompt: &str) -> anyhow::Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(anyhow::Error::msg)?;
        let context: Vec<u32> = encoding.get_ids().to_vec();
        if context.is_empty() {
            return Err(Error::InvalidArgument("prompt produced no tokens".into()).into());
        }

        let mut texts = Vec::with_capacity(self.options.nsamples);
        for round in 0..self.options.rounds() {
            tracing::debug!(round, "sampling batch");
            for row in self.sample_round(&context)? {
                let text = self
                    .tokenizer
                    .decode(&row, true)
                    .map_err(anyhow::Error::msg)?;
                texts.push(text);
            }
        }
        Ok(texts)
    }

    /// One sampling round: replicate the context across the batch, prefill,
    /// then decode `length` tokens incrementally. Returns `batch_size` rows
    /// of newly generated token ids.
    fn sample_round(&mut self, context: &[u32]) -> anyhow::Result<Vec<Vec<u32>>> {
        let batch_size = self.options.batch_size;
        let length = self.options.length;
        let n_layer = self.model.hparams().n_layer;

        // Fresh cache per round; each row of the batch shares it along the
        // batch axis.
        let mut cache: Vec<LayerKVCache> = Vec::new();
        cache.resize_with(n_layer, LayerKVCache::default);

        let row = Tensor::new(context, &self.device)?;
        let rows: Vec<Tensor> = (0..batch_size).map(|_| row.clone()).collect();
        let input = Tensor::stack(&rows, 0)?; // (batch, prompt_len)

        // Prefill: one pass over the full prompt.
        let logits = self
            .model
            .forward_with_cache(&input, Some(cache.as_mut_slice()))?;
        let (_, t, _) = logits.dims3()?;

        let mut generated: Vec<Vec<u32>> = vec![Vec::with_capacity(length); batch_size];
        let mut next: Vec<u32> = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let token = self.sampler.sample(&logits.i((i, t - 1))?)?;
            generated[i].push(token);
            next.push(token);
        }

        // Decode: one position per step, reusing the cache.
        for _ in 1..length {
            let input = Tensor::from_vec(next.clone(), (batch_size, 1), &self.device)?;
            let logits = self
                .model
                .forward_with_cache(&input, Some(cache.as_mut_slice()))?;
            for i in 0..batch_size {
                let token = self.sampler.sample(&logits.i((i, 0))?)?;
                generated[i].push(token);
                next[i] = token;
            }
        }

        Ok(generated)
    }
}

/// Most recently modified `*.safetensors` file under the model directory.
fn latest_checkpoint(model_dir: &Path) -> Result<PathBuf, Error> {
    let not_found = || Error::CheckpointNotFound(model_dir.to_path_buf());
    let entries = std::fs::read_dir(model_dir).map_err(|_| not_found())?;

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "safetensors") {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
    }
    newest.map(|(_, path)| path).ok_or_else(not_found)
}
