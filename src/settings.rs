//! Settings
//!
//! Persistence of harness configuration as JSON under the platform data
//! directory. Missing or corrupt files fall back to defaults.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::GenParams;

/// Errors from settings persistence
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Harness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Address the server binds and the client connects to
    pub host: String,
    pub port: u16,
    /// Path to the GGUF model; `None` means the fixed debug source
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Number of layers to offload to GPU (0 = CPU only)
    pub gpu_layers: u32,
    /// Upper bound on the request read, bytes
    pub recv_bytes: usize,
    /// Chunks streamed before the connection is closed
    pub max_iterations: usize,
    /// Chars of output yielded (and re-fed) per windowed iteration
    pub window_chars: usize,
    /// New tokens generated per completion call
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Repetition penalty
    pub repeat_penalty: f32,
    /// Sampling seed (0 = random)
    #[serde(default)]
    pub seed: u32,
    /// Context window size
    pub context_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5087,
            model_path: None,
            gpu_layers: 0,
            recv_bytes: 4096,
            max_iterations: 10,
            window_chars: 50,
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

impl Settings {
    /// Validate settings values
    ///
    /// Clamps parameters to acceptable ranges and resets nonsensical values
    /// to their defaults.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = 40;
        }
        if self.port == 0 {
            self.port = 5087;
        }
        if self.recv_bytes == 0 {
            self.recv_bytes = 4096;
        }

        self.max_iterations = self.max_iterations.max(1);
        self.window_chars = self.window_chars.max(1);
        self.max_tokens = self.max_tokens.clamp(1, 4096);
        self.context_size = self.context_size.clamp(512, 131072);

        // Can't generate more than the context allows
        if self.max_tokens > self.context_size {
            self.max_tokens = self.context_size / 2;
        }

        if self.repeat_penalty < 1.0 {
            self.repeat_penalty = 1.1;
        }
    }

    /// Generation parameters derived from these settings
    pub fn gen_params(&self) -> GenParams {
        GenParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            seed: self.seed,
            context_size: self.context_size,
        }
    }
}

/// Get the settings file path
fn settings_path() -> Result<PathBuf, SettingsError> {
    let dirs = ProjectDirs::from("", "", "bloomstream").ok_or(SettingsError::NoDataDir)?;
    Ok(dirs.data_dir().join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted.
pub fn load_settings() -> Settings {
    let path = match settings_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("No settings path, using defaults: {e}");
            return Settings::default();
        }
    };
    match load_from(&path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {e}");
            Settings::default()
        }
    }
}

fn load_from(path: &std::path::Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(Settings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: Settings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from disk");
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &Settings) -> Result<(), SettingsError> {
    save_to(&settings_path()?, settings)
}

fn save_to(path: &std::path::Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to disk");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 5087);
        assert_eq!(settings.recv_bytes, 4096);
        assert_eq!(settings.max_iterations, 10);
        assert_eq!(settings.window_chars, 50);
        assert!(settings.model_path.is_none());
    }

    #[test]
    fn test_validation_clamps() {
        let mut settings = Settings::default();

        settings.temperature = 5.0;
        settings.validate();
        assert_eq!(settings.temperature, 2.0);

        settings.top_p = 2.0;
        settings.validate();
        assert_eq!(settings.top_p, 1.0);

        settings.port = 0;
        settings.validate();
        assert_eq!(settings.port, 5087);

        settings.max_iterations = 0;
        settings.window_chars = 0;
        settings.validate();
        assert_eq!(settings.max_iterations, 1);
        assert_eq!(settings.window_chars, 1);
    }

    #[test]
    fn test_max_tokens_capped_by_context_size() {
        let mut settings = Settings::default();
        settings.context_size = 512;
        settings.max_tokens = 4096;
        settings.validate();
        assert_eq!(settings.max_tokens, 256);

        // within the context, left alone
        settings.max_tokens = 100;
        settings.validate();
        assert_eq!(settings.max_tokens, 100);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).expect("serialize");
        let loaded: Settings = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(settings.port, loaded.port);
        assert_eq!(settings.window_chars, loaded.window_chars);
        assert_eq!(settings.temperature, loaded.temperature);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.port = 6001;
        settings.max_iterations = 3;

        save_to(&path, &settings).expect("save");
        let loaded = load_from(&path).expect("load");
        assert_eq!(loaded.port, 6001);
        assert_eq!(loaded.max_iterations, 3);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_from(&dir.path().join("absent.json")).expect("load");
        assert_eq!(loaded.port, 5087);
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_from(&path), Err(SettingsError::Json(_))));
    }
}
