//! Inference engine
//!
//! Wraps llama-cpp model loading and completion behind a blocking API.
//!
//! # Architecture
//!
//! llama-cpp-2 types (`LlamaBackend`, `LlamaModel`, `LlamaContext`) contain
//! raw pointers that are not `Send`, so the backend and model live on a
//! dedicated worker thread for the lifetime of the engine. Callers talk to
//! the worker over `std::sync::mpsc` channels; `complete` blocks until the
//! worker has streamed the whole continuation back.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use rand::Rng;
use thiserror::Error;

use crate::inference::model::{validate_gguf, ModelError, ModelInfo};
use crate::inference::streaming::{StreamToken, Utf8Accumulator};

/// Errors that can occur during inference operations
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("Failed to initialize backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Model validation failed: {0}")]
    ModelValidation(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Worker thread error: {0}")]
    Worker(String),
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::ModelValidation(e.to_string())
    }
}

/// Generation parameters for a single completion call
#[derive(Debug, Clone)]
pub struct GenParams {
    /// Maximum number of new tokens to generate
    pub max_tokens: u32,
    /// Temperature for sampling (below 0.01 switches to greedy)
    pub temperature: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Top-p (nucleus) sampling parameter
    pub top_p: f32,
    /// Repetition penalty over the recent window
    pub repeat_penalty: f32,
    /// Random seed for sampling (0 = draw one from entropy)
    pub seed: u32,
    /// Context window size
    pub context_size: u32,
}

impl Default for GenParams {
    fn default() -> Self {
        // Tuned for short chunked completions, not long-form output.
        Self {
            max_tokens: 50,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            repeat_penalty: 1.1,
            seed: 0,
            context_size: 4096,
        }
    }
}

/// Commands sent to the worker thread
enum WorkerCommand {
    Complete {
        prompt: String,
        params: GenParams,
        token_tx: Sender<StreamToken>,
    },
    Shutdown,
}

/// Blocking inference engine over llama-cpp-2
///
/// Loading happens once at construction; every `complete` call creates a
/// fresh context on the worker thread, so calls are independent of each
/// other.
pub struct InferenceEngine {
    command_tx: Sender<WorkerCommand>,
    worker_handle: Option<JoinHandle<()>>,
    info: ModelInfo,
}

impl InferenceEngine {
    /// Loads a GGUF model and spins up the inference worker.
    ///
    /// # Arguments
    /// * `path` - Path to the GGUF model file
    /// * `gpu_layers` - Number of layers to offload to GPU (0 = CPU only)
    pub fn load<P: AsRef<Path>>(path: P, gpu_layers: u32) -> Result<Self, EngineError> {
        let path = path.as_ref();

        // Validate the GGUF header first, plain file I/O on this thread
        let meta = validate_gguf(path)?;
        tracing::debug!(version = meta.version, "GGUF validation passed");

        let (info_tx, info_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();

        let worker_path = path.to_path_buf();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            worker_thread_main(worker_path, gpu_layers, info_tx, command_rx);
        });

        let info = info_rx
            .recv()
            .map_err(|e| EngineError::Worker(e.to_string()))??;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            path = %info.path,
            params = info.param_count,
            vocab = info.vocab_size,
            ctx = info.context_length,
            "model loaded"
        );

        Ok(Self {
            command_tx,
            worker_handle: Some(handle),
            info,
        })
    }

    /// Returns information about the loaded model
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Runs one completion and blocks until it finishes.
    ///
    /// Returns only the generated continuation, not the prompt.
    pub fn complete(&self, prompt: &str, params: &GenParams) -> Result<String, EngineError> {
        let (token_tx, token_rx) = mpsc::channel();

        self.command_tx
            .send(WorkerCommand::Complete {
                prompt: prompt.to_string(),
                params: params.clone(),
                token_tx,
            })
            .map_err(|e| EngineError::Worker(e.to_string()))?;

        let mut out = String::new();
        loop {
            match token_rx.recv() {
                Ok(StreamToken::Token(piece)) => out.push_str(&piece),
                Ok(StreamToken::Done) => break,
                Ok(StreamToken::Error(msg)) => return Err(EngineError::Inference(msg)),
                Err(e) => return Err(EngineError::Worker(e.to_string())),
            }
        }
        Ok(out)
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Worker thread main loop
///
/// Owns the backend and model; loads at startup, then serves completion
/// commands until shutdown or channel close.
fn worker_thread_main(
    path: PathBuf,
    gpu_layers: u32,
    info_tx: Sender<Result<ModelInfo, EngineError>>,
    command_rx: Receiver<WorkerCommand>,
) {
    let backend = match LlamaBackend::init() {
        Ok(b) => b,
        Err(e) => {
            let _ = info_tx.send(Err(EngineError::BackendInit(e.to_string())));
            return;
        }
    };

    let model_params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
    let model = match LlamaModel::load_from_file(&backend, &path, &model_params) {
        Ok(m) => m,
        Err(e) => {
            let _ = info_tx.send(Err(EngineError::ModelLoad(e.to_string())));
            return;
        }
    };

    let info = ModelInfo {
        path: path.to_string_lossy().to_string(),
        vocab_size: model.n_vocab(),
        embedding_dim: model.n_embd(),
        context_length: model.n_ctx_train(),
        param_count: model.n_params() as u64,
        size_bytes: model.size() as u64,
    };
    if info_tx.send(Ok(info)).is_err() {
        // Caller went away before the load finished
        return;
    }

    loop {
        match command_rx.recv() {
            Ok(WorkerCommand::Complete {
                prompt,
                params,
                token_tx,
            }) => {
                if let Err(e) = run_completion(&backend, &model, &prompt, &params, &token_tx) {
                    let _ = token_tx.send(StreamToken::Error(e));
                }
            }
            Ok(WorkerCommand::Shutdown) | Err(_) => {
                tracing::debug!("inference worker exiting");
                break;
            }
        }
    }
}

/// Runs one completion on the worker thread, streaming pieces to `tx`.
fn run_completion(
    backend: &LlamaBackend,
    model: &LlamaModel,
    prompt: &str,
    params: &GenParams,
    tx: &Sender<StreamToken>,
) -> Result<(), String> {
    let start = Instant::now();

    let n_ctx = params.context_size.min(model.n_ctx_train()).max(512);
    let n_ctx = NonZeroU32::new(n_ctx).ok_or_else(|| "context size is zero".to_string())?;
    let ctx_params = LlamaContextParams::default()
        .with_n_ctx(Some(n_ctx))
        .with_n_batch(512);

    let mut ctx = model
        .new_context(backend, ctx_params)
        .map_err(|e| format!("Failed to create context: {e}"))?;

    let tokens = model
        .str_to_token(prompt, AddBos::Always)
        .map_err(|e| format!("Failed to tokenize: {e}"))?;
    tracing::debug!(n_tokens = tokens.len(), "prompt tokenized");

    let mut batch = LlamaBatch::new(512, 1);
    for (i, token) in tokens.iter().enumerate() {
        let is_last = i == tokens.len() - 1;
        batch
            .add(*token, i as i32, &[0], is_last)
            .map_err(|e| format!("Failed to add token to batch: {e}"))?;
    }
    ctx.decode(&mut batch)
        .map_err(|e| format!("Failed to decode prompt: {e}"))?;

    let mut sampler = build_sampler(params);
    let mut n_decoded = tokens.len() as i32;
    let mut acc = Utf8Accumulator::new();
    let mut generated = 0u32;

    for _ in 0..params.max_tokens {
        let new_token = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(new_token);

        if model.is_eog_token(new_token) {
            tracing::debug!("end of generation token");
            break;
        }

        let token_bytes = model
            .token_to_bytes(new_token, Special::Tokenize)
            .map_err(|e| format!("Failed to convert token to bytes: {e}"))?;

        if let Some(piece) = acc.push_bytes(&token_bytes) {
            if tx.send(StreamToken::Token(piece)).is_err() {
                tracing::debug!("receiver dropped, stopping completion");
                return Ok(());
            }
        }
        generated += 1;

        batch.clear();
        batch
            .add(new_token, n_decoded, &[0], true)
            .map_err(|e| format!("Failed to add token to batch: {e}"))?;
        ctx.decode(&mut batch)
            .map_err(|e| format!("Failed to decode: {e}"))?;
        n_decoded += 1;
    }

    if let Some(piece) = acc.flush() {
        let _ = tx.send(StreamToken::Token(piece));
    }
    let _ = tx.send(StreamToken::Done);

    tracing::debug!(
        tokens = generated,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "completion finished"
    );
    Ok(())
}

/// Builds the sampler chain for one completion.
///
/// The repeat penalty stands in for n-gram blocking: same intent of keeping
/// short chunked completions from looping on themselves.
fn build_sampler(params: &GenParams) -> LlamaSampler {
    if params.temperature < 0.01 {
        return LlamaSampler::greedy();
    }

    let seed = if params.seed == 0 {
        rand::thread_rng().gen()
    } else {
        params.seed
    };

    LlamaSampler::chain_simple([
        LlamaSampler::penalties(64, params.repeat_penalty, 0.0, 0.0),
        LlamaSampler::top_k(params.top_k as i32),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(seed),
    ])
}
