// LLM provider configuration: which of the two interchangeable
// text-generation backends to use, and the credential for each.
//
// Persisted as a small TOML file; mirrored in an in-process cache so reads
// within one session see the last saved value without touching disk. The
// cache lives on the store object, not in a global.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

// ---------------------------------------------------------------------------
// Provider and endpoints
// ---------------------------------------------------------------------------

const CDAC_ENDPOINT: &str = "https://apis.airawat.cdac.in/wrp/gpt20b/v1/chat/completions";
const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// The two interchangeable text-generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Cdac,
    Gemini,
}

impl LlmProvider {
    /// Endpoint resolution is static; there is no runtime discovery.
    pub fn endpoint(self) -> &'static str {
        match self {
            LlmProvider::Cdac => CDAC_ENDPOINT,
            LlmProvider::Gemini => GEMINI_ENDPOINT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LlmProvider::Cdac => "cdac",
            LlmProvider::Gemini => "gemini",
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// The operator's provider choice plus both credentials. Keys are stored
/// as-is; no format validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub cdac_api_key: String,
    pub gemini_api_key: String,
}

impl LlmConfig {
    /// The credential matching the active provider.
    pub fn current_key(&self) -> &str {
        match self.provider {
            LlmProvider::Cdac => &self.cdac_api_key,
            LlmProvider::Gemini => &self.gemini_api_key,
        }
    }

    /// True iff the active provider's key is non-empty after trimming.
    pub fn is_configured(&self) -> bool {
        !self.current_key().trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// LlmConfigStore
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmConfigError {
    #[error("failed to persist llm config at {path}: {message}")]
    Save { path: PathBuf, message: String },
}

/// Persistent provider configuration with a same-session mirror.
///
/// `load` prefers the mirror (set only by `save`), then the TOML file, then
/// defaults. An unreadable or corrupt file is logged and treated as absent,
/// never an error.
pub struct LlmConfigStore {
    path: PathBuf,
    cached: Mutex<Option<LlmConfig>>,
}

impl LlmConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn load(&self) -> LlmConfig {
        if let Some(config) = self.cached.lock().unwrap().as_ref() {
            return config.clone();
        }
        self.load_from_file()
    }

    /// Write the config to disk and update the session mirror. Idempotent.
    pub fn save(&self, config: LlmConfig) -> Result<(), LlmConfigError> {
        let save_err = |message: String| LlmConfigError::Save {
            path: self.path.clone(),
            message,
        };

        let text = toml::to_string_pretty(&config).map_err(|e| save_err(e.to_string()))?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| save_err(e.to_string()))?;

        // Unique temp file per save; concurrent saves race only on the
        // atomic rename.
        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| save_err(e.to_string()))?;
        tmp.write_all(text.as_bytes())
            .map_err(|e| save_err(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| save_err(e.to_string()))?;

        *self.cached.lock().unwrap() = Some(config);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(&self) -> LlmConfig {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return LlmConfig::default(),
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "ignoring malformed llm config at {}: {e}",
                    self.path.display()
                );
                LlmConfig::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
