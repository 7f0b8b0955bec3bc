// Server configuration loading and parsing (config/server.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerSection,
    storage: StorageConfig,
    llm: LlmSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    port: u16,
}

/// Locations of the live document, the template, and the default-values
/// fixture. Paths are resolved relative to the process working directory;
/// they are configuration, not part of the wire contract.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_file: String,
    pub template_file: String,
    pub default_values_file: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmSection {
    config_file: String,
    request_timeout_secs: u64,
}

/// The assembled runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageConfig,
    pub llm_config_file: String,
    pub llm_request_timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml` relative to the
/// given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("server.toml");
    let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
        path: path.clone(),
    })?;

    let file: ServerFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        port: file.server.port,
        storage: file.storage,
        llm_config_file: file.llm.config_file,
        llm_request_timeout_secs: file.llm.request_timeout_secs,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files and
/// the data fixtures (those are read from defaults/ directly).
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };

        // Only TOML config files are provisioned; JSON fixtures stay in
        // defaults/ where the store reads them.
        let is_config = file_name
            .to_str()
            .is_some_and(|n| n.ends_with(".toml") && !n.ends_with(".example"));
        if !is_config {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, keep the operator's copy.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying default config files first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    let path_fields: &[(&str, &str)] = &[
        ("storage.data_file", &config.storage.data_file),
        ("storage.template_file", &config.storage.template_file),
        (
            "storage.default_values_file",
            &config.storage.default_values_file,
        ),
        ("llm.config_file", &config.llm_config_file),
    ];
    for (name, val) in path_fields {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    if config.llm_request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "llm.request_timeout_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
