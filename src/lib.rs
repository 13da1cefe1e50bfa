//! bloomstream
//!
//! Experimental harness for streaming text from a local causal-language
//! model over a TCP socket: one client, one request, a stream of chunks.
//! Generation itself is delegated to llama.cpp via `llama-cpp-2`.

pub mod client;
pub mod generator;
pub mod inference;
pub mod sampling;
pub mod server;
pub mod settings;
