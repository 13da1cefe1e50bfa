//! Load/inference timing harness
//!
//! Times model loading and one completion, then prints both. The prompt is
//! cut from a source file: ten lines starting at `fn main` when present,
//! the head of the file otherwise.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bloomstream::inference::{GenParams, InferenceEngine};
use bloomstream::settings::load_settings;

/// Lines of source fed as the prompt
const SNIPPET_LINES: usize = 10;

/// Prompt used when no source file is given
const FALLBACK_PROMPT: &str = "fn main() {\n    println!(\"Hello, world!\");\n}\n";

#[derive(Parser, Debug)]
#[command(version, about = "Time model load and a single completion")]
struct Args {
    /// Path to the GGUF model
    #[arg(short, long)]
    model: PathBuf,

    /// New tokens to generate
    #[arg(short, long, default_value_t = 100)]
    response_len: u32,

    /// Source file to cut a prompt from
    #[arg(short = 'f', long)]
    prompt_file: Option<PathBuf>,

    /// Number of layers to offload to GPU
    #[arg(short, long)]
    gpu_layers: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = load_settings();

    let prompt = match &args.prompt_file {
        Some(path) => snippet_from(path)?,
        None => FALLBACK_PROMPT.to_string(),
    };

    let start = Instant::now();
    let engine = InferenceEngine::load(&args.model, args.gpu_layers.unwrap_or(settings.gpu_layers))?;
    let load_time = start.elapsed();
    println!("Model loading time: {:.2}s", load_time.as_secs_f64());

    let params = GenParams {
        max_tokens: args.response_len,
        ..settings.gen_params()
    };

    let start = Instant::now();
    let completion = engine.complete(&prompt, &params)?;
    let gen_time = start.elapsed();

    println!("{prompt}{completion}");
    println!(
        "Generation time: {:.2}s ({} tokens requested)",
        gen_time.as_secs_f64(),
        args.response_len
    );
    Ok(())
}

/// Cuts a prompt out of a source file.
///
/// Takes `SNIPPET_LINES` lines starting at the last line containing
/// `fn main`, or from the top when there is no main function.
fn snippet_from(path: &Path) -> std::io::Result<String> {
    let source = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = source.lines().collect();
    let start = lines
        .iter()
        .rposition(|line| line.contains("fn main"))
        .unwrap_or(0);

    let mut snippet = lines
        .iter()
        .skip(start)
        .take(SNIPPET_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    snippet.push('\n');
    Ok(snippet)
}
