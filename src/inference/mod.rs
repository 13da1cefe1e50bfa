//! LLM inference
//!
//! This module handles all interaction with llama-cpp for model loading and
//! text completion.

pub mod engine;
pub mod model;
pub mod streaming;

// Re-export main types for convenience
pub use engine::{EngineError, GenParams, InferenceEngine};
pub use model::{validate_gguf, GgufMetadata, ModelError, ModelInfo, GGUF_MAGIC};
pub use streaming::{StreamToken, Utf8Accumulator};
