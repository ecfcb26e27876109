//! Interactive CLI front end: sample attributed quotes from a pretrained
//! GPT-2-style model.
//!
//! Two modes, selected once at startup:
//! * `--prompt-url` — fetch the prompt once over HTTP, run one
//!   generation-and-filter cycle, exit.
//! * interactive (default) — REPL on stdin; empty input re-prompts,
//!   end-of-input terminates.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use candle_core::Device;
use clap::Parser;

use quotegen_common::{Error, RawOptions};
use quotegen_infer::InferenceRuntime;

#[derive(Parser, Debug)]
#[command(
    name = "quotegen",
    about = "Sample attributed quotes from a pretrained language model"
)]
struct Args {
    /// Which model under the models root to load.
    #[arg(long, default_value = "117M")]
    model_name: String,
    /// Directory holding one subdirectory per model.
    #[arg(long, default_value = "models")]
    models_root: PathBuf,
    /// Fix the RNG seed to reproduce results.
    #[arg(long)]
    seed: Option<u64>,
    /// Total number of samples to return per prompt.
    #[arg(long, default_value_t = 1)]
    nsamples: usize,
    /// Rows per sampling round (speed/memory only); must divide nsamples.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Tokens per generated text; defaults to half the context window.
    #[arg(long)]
    length: Option<usize>,
    /// Boltzmann temperature; lower is less random.
    #[arg(long, default_value_t = 1.0)]
    temperature: f64,
    /// Consider only the k most likely tokens per step; 0 = unrestricted.
    #[arg(long, default_value_t = 0)]
    top_k: usize,
    /// Nucleus sampling threshold; a value > 0 overrides top-k.
    #[arg(long, default_value_t = 0.0)]
    top_p: f64,
    /// Fetch the prompt once from this URL instead of reading stdin.
    #[arg(long)]
    prompt_url: Option<String>,
    /// Attribution the quote filter requires.
    #[arg(long, default_value = quotegen_infer::DEFAULT_AUTHOR)]
    author: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let device = Device::cuda_if_available(0)?;

    let raw = RawOptions {
        nsamples: args.nsamples,
        batch_size: args.batch_size,
        length: args.length,
        temperature: args.temperature,
        top_k: args.top_k,
        top_p: args.top_p,
        seed: args.seed,
    };

    tracing::info!(model = %args.model_name, "loading model");
    let mut runtime =
        InferenceRuntime::load(&args.models_root, &args.model_name, raw, device)?;

    if let Some(url) = args.prompt_url {
        return run_url_mode(&url, |prompt| runtime.sample_quotes(prompt, &args.author));
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    run_interactive(&mut input, &mut output, |prompt| {
        runtime.sample_quotes(prompt, &args.author)
    })
}

/// URL mode: exactly one fetch and one generation cycle, regardless of
/// sample/batch configuration, then the session ends. A failed fetch is
/// fatal and generation never runs.
fn run_url_mode<F>(url: &str, mut generate: F) -> Result<()>
where
    F: FnMut(&str) -> Result<Vec<String>>,
{
    let prompt = fetch_prompt(url)?;
    print_quotes(&generate(&prompt)?);
    Ok(())
}

/// Interactive mode: one generation cycle per non-empty prompt until
/// end-of-input.
fn run_interactive<R, W, F>(input: &mut R, output: &mut W, mut generate: F) -> Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> Result<Vec<String>>,
{
    while let Some(prompt) = read_prompt(input, output)? {
        print_quotes(&generate(&prompt)?);
    }
    Ok(())
}

/// Single unauthenticated GET; the whole response body is the prompt.
/// No retry, no timeout: any transport or HTTP-status failure is fatal.
fn fetch_prompt(url: &str) -> Result<String, Error> {
    let fetch_err = |e: reqwest::Error| Error::PromptFetch {
        url: url.to_string(),
        reason: e.to_string(),
    };
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(fetch_err)?;
    response.text().map_err(fetch_err)
}

/// Read a non-empty prompt line. Empty submissions print a validation
/// message and re-prompt without touching any other state; end-of-input
/// yields `None` and ends the session.
fn read_prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Option<String>> {
    loop {
        write!(output, "Model prompt >>> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            writeln!(output, "Prompt should not be empty!")?;
            continue;
        }
        return Ok(Some(line.to_string()));
    }
}

/// One retained quote per line, in generation order.
fn print_quotes(quotes: &[String]) {
    for quote in quotes {
        println!("{quote}");
    }
}
