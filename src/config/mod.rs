//! Configuration management for the brief gateway
//!
//! Values are layered env > TOML file > defaults and handed to each component
//! at construction; nothing reads configuration from global state.

pub mod file;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Voice used when no table entry matches and none is configured
pub const DEFAULT_VOICE: &str = "694f9389-aac1-45b6-b726-9d9369183238";

/// Backend used when none is configured
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8123/agents/execute/stream";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Language and voice selection
    pub voice: VoiceConfig,

    /// Streaming backend
    pub backend: BackendConfig,

    /// Speech synthesis relay
    pub speech: SpeechConfig,

    /// Per-session behavior
    pub session: SessionConfig,

    /// HTTP API server port
    pub port: u16,
}

/// Language/voice configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Language used when neither the event nor the session declares one
    pub default_language: String,

    /// Voice used when the language has no table entry
    pub default_voice: String,

    /// Language tag to voice id table
    pub voices: HashMap<String, String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            default_voice: DEFAULT_VOICE.to_string(),
            voices: HashMap::new(),
        }
    }
}

/// Streaming backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Streaming endpoint URL
    pub url: String,

    /// Maximum attempts per generation (at least 1)
    pub max_attempts: u32,

    /// Upper bound on a single attempt, connect through end of stream
    pub attempt_timeout: Duration,

    /// Linear backoff base; attempt `n` waits `backoff_base * n` before retrying
    pub backoff_base: Duration,

    /// Value sent as `user_context.source`
    pub source: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(20),
            backoff_base: Duration::from_secs(2),
            source: "brief-gateway".to_string(),
        }
    }
}

/// Speech relay configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Synthesis endpoint; speech is disabled when `None`
    pub url: Option<String>,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Per-session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Greeting published and spoken when a session opens
    pub greeting: Option<String>,

    /// Pending events allowed per session before routing backpressures
    pub queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: None,
            queue_depth: 16,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            voice: VoiceConfig::default(),
            backend: BackendConfig::default(),
            speech: SpeechConfig::default(),
            session: SessionConfig::default(),
            port: 8000,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Layer `env` over a parsed config file over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn resolve<F>(fc: file::GatewayConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let voice = VoiceConfig {
            default_language: env("BRIEF_DEFAULT_LANGUAGE")
                .or(fc.voice.default_language)
                .unwrap_or(defaults.voice.default_language),
            default_voice: env("BRIEF_DEFAULT_VOICE")
                .or(fc.voice.default_voice)
                .unwrap_or(defaults.voice.default_voice),
            voices: fc
                .voice
                .voices
                .into_iter()
                .map(|(lang, voice)| (lang.to_lowercase(), voice))
                .collect(),
        };

        let max_attempts = parse_env(&env, "BRIEF_BACKEND_MAX_ATTEMPTS")?
            .or(fc.backend.max_attempts)
            .unwrap_or(defaults.backend.max_attempts);
        if max_attempts == 0 {
            return Err(Error::Config(
                "backend max attempts must be at least 1".to_string(),
            ));
        }

        let backend = BackendConfig {
            url: env("BRIEF_BACKEND_URL")
                .or(fc.backend.url)
                .unwrap_or(defaults.backend.url),
            max_attempts,
            attempt_timeout: parse_env(&env, "BRIEF_BACKEND_TIMEOUT_SECS")?
                .or(fc.backend.timeout_secs)
                .map_or(defaults.backend.attempt_timeout, Duration::from_secs),
            backoff_base: parse_env(&env, "BRIEF_BACKEND_BACKOFF_MS")?
                .or(fc.backend.backoff_ms)
                .map_or(defaults.backend.backoff_base, Duration::from_millis),
            source: env("BRIEF_BACKEND_SOURCE")
                .or(fc.backend.source)
                .unwrap_or(defaults.backend.source),
        };

        let speech = SpeechConfig {
            url: env("BRIEF_SPEECH_URL").or(fc.speech.url),
            timeout: fc
                .speech
                .timeout_secs
                .map_or(defaults.speech.timeout, Duration::from_secs),
        };

        let queue_depth = fc
            .session
            .queue_depth
            .unwrap_or(defaults.session.queue_depth);
        if queue_depth == 0 {
            return Err(Error::Config(
                "session queue depth must be at least 1".to_string(),
            ));
        }

        let session = SessionConfig {
            greeting: env("BRIEF_GREETING")
                .or(fc.session.greeting)
                .filter(|g| !g.trim().is_empty()),
            queue_depth,
        };

        let port = match parse_env(&env, "BRIEF_PORT")? {
            Some(port) => port,
            None => parse_env(&env, "PORT")?
                .or(fc.server.port)
                .unwrap_or(defaults.port),
        };

        Ok(Self {
            voice,
            backend,
            speech,
            session,
            port,
        })
    }
}

/// Parse an optional env value, rejecting values that are present but malformed
fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("invalid {key} ({raw:?}): {e}")))
        })
        .transpose()
}
