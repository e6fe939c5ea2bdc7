//! TOML configuration file loading
//!
//! Supports `~/.config/brief/gateway/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// Language and voice selection
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Streaming backend
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Speech synthesis relay
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Per-session behavior
    #[serde(default)]
    pub session: SessionFileConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Language/voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Language used when neither the event nor the session declares one
    pub default_language: Option<String>,

    /// Voice used when the language has no table entry
    pub default_voice: Option<String>,

    /// Language tag to voice id table
    #[serde(default)]
    pub voices: HashMap<String, String>,
}

/// Backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Streaming endpoint URL
    pub url: Option<String>,

    /// Maximum attempts per generation
    pub max_attempts: Option<u32>,

    /// Per-attempt timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Linear backoff base in milliseconds
    pub backoff_ms: Option<u64>,

    /// Value sent as `user_context.source`
    pub source: Option<String>,
}

/// Speech relay configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Synthesis endpoint; speech is disabled when absent
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Greeting spoken when a session opens
    pub greeting: Option<String>,

    /// Pending events allowed per session before routing backpressures
    pub queue_depth: Option<usize>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `GatewayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> GatewayConfigFile {
    config_file_path().map_or_else(GatewayConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> GatewayConfigFile {
    if !path.exists() {
        return GatewayConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GatewayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GatewayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/brief/gateway/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("brief")
            .join("gateway")
            .join("config.toml")
    })
}
