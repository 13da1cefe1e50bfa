//! Test client binary
//!
//! Sends one request and prints everything the server streams back.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bloomstream::client::Client;
use bloomstream::settings::load_settings;

#[derive(Parser, Debug)]
#[command(version, about = "Fetch one streamed response from the server")]
struct Args {
    /// Server address override
    #[arg(long)]
    host: Option<String>,

    /// Server port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Request text sent to the server
    #[arg(short, long, default_value = "get on with it")]
    message: String,
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
    settings.validate();

    let client = Client::new(settings.host, settings.port);
    let received = client.fetch(&args.message)?;

    println!("Client received:\n{received}");
    Ok(())
}
