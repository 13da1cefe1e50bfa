//! Streaming server binary
//!
//! Loads the model (if one is configured), waits for a single client, and
//! streams chunks back over the connection.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bloomstream::generator::{FixedGenerator, WindowedGenerator};
use bloomstream::inference::InferenceEngine;
use bloomstream::server::Server;
use bloomstream::settings::load_settings;

/// Text streamed when no model is configured, one chunk per iteration.
const FIXED_TEXT: &str = "Some prompt";

/// Prompt used when the client request is empty.
const FALLBACK_PROMPT: &str = "Once upon a time";

#[derive(Parser, Debug)]
#[command(version, about = "Stream generated text to a single TCP client")]
struct Args {
    /// Path to a GGUF model; omit to stream fixed debug text
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Bind port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Chunks to stream before closing the connection
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Delay between fixed chunks, milliseconds
    #[arg(long, default_value_t = 2000)]
    fixed_delay_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(iterations) = args.iterations {
        settings.max_iterations = iterations;
    }
    settings.validate();

    let model_path = args.model.or_else(|| settings.model_path.clone());

    let server = Server::new(&settings);
    match model_path {
        Some(path) => {
            // Load before accepting so the client never waits on model I/O
            let engine = InferenceEngine::load(&path, settings.gpu_layers)?;

            let listener = server.bind()?;
            let (mut conn, request) = server.accept(&listener)?;

            let prompt = if request.trim().is_empty() {
                tracing::warn!("empty request, using fallback prompt");
                FALLBACK_PROMPT.to_string()
            } else {
                request
            };

            let mut source =
                WindowedGenerator::new(&engine, prompt, settings.window_chars, settings.gen_params());
            server.stream_response(&mut conn, &mut source)?;
        }
        None => {
            tracing::info!("no model configured, streaming fixed text");
            let listener = server.bind()?;
            let (mut conn, _request) = server.accept(&listener)?;

            let mut source =
                FixedGenerator::new(FIXED_TEXT, Duration::from_millis(args.fixed_delay_ms));
            server.stream_response(&mut conn, &mut source)?;
        }
    }

    tracing::info!("response complete, shutting down");
    Ok(())
}
