//! GGUF model file validation
//!
//! Cheap header checks performed before handing a path to llama.cpp, so a
//! wrong file fails with a useful error instead of deep inside the backend.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// "GGUF" as a little-endian u32, the first four bytes of every GGUF file.
pub const GGUF_MAGIC: u32 = 0x4655_4747;

/// GGUF versions this harness knows how to hand to llama.cpp.
const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 1..=3;

/// Errors from pre-load model file validation
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(String),

    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a GGUF file (magic {0:#010x})")]
    BadMagic(u32),

    #[error("unsupported GGUF version {0}")]
    UnsupportedVersion(u32),
}

/// Header metadata extracted during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufMetadata {
    /// GGUF format version
    pub version: u32,
    /// Size of the file on disk in bytes
    pub size_bytes: u64,
}

/// Model information reported after a successful load
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Path the model was loaded from
    pub path: String,
    /// Vocabulary size
    pub vocab_size: i32,
    /// Embedding dimension
    pub embedding_dim: i32,
    /// Training context length
    pub context_length: u32,
    /// Total parameter count
    pub param_count: u64,
    /// Model size in bytes
    pub size_bytes: u64,
}

/// Validates that `path` points at a readable GGUF file.
///
/// Checks the magic number and format version and returns the header
/// metadata. Does not parse tensors; llama.cpp does the real loading.
pub fn validate_gguf<P: AsRef<Path>>(path: P) -> Result<GgufMetadata, ModelError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ModelError::NotFound(path.to_string_lossy().to_string()));
    }

    let mut file = File::open(path)?;
    let size_bytes = file.metadata()?.len();

    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;

    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != GGUF_MAGIC {
        return Err(ModelError::BadMagic(magic));
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ModelError::UnsupportedVersion(version));
    }

    Ok(GgufMetadata {
        version,
        size_bytes,
    })
}
