//! Language tag to voice id lookup

use std::collections::HashMap;

use crate::config::VoiceConfig;

/// Maps language tags to synthesis voices
///
/// Lookup never fails: a tag with no entry resolves to the default voice.
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    default_voice: String,
    voices: HashMap<String, String>,
}

impl VoiceSelector {
    /// Create a selector from a default voice and a language table
    #[must_use]
    pub fn new(default_voice: impl Into<String>, voices: HashMap<String, String>) -> Self {
        Self {
            default_voice: default_voice.into(),
            voices: voices
                .into_iter()
                .map(|(lang, voice)| (normalize(&lang), voice))
                .collect(),
        }
    }

    /// Build a selector from configuration
    #[must_use]
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(config.default_voice.clone(), config.voices.clone())
    }

    /// Resolve the voice for a language tag
    ///
    /// Tries the full tag, then its primary subtag (`nl-BE` → `nl`), then
    /// falls back to the default voice.
    #[must_use]
    pub fn resolve(&self, language: &str) -> &str {
        let tag = normalize(language);
        if let Some(voice) = self.voices.get(&tag) {
            return voice;
        }

        let primary = tag.split('-').next().unwrap_or_default();
        self.voices
            .get(primary)
            .map_or(self.default_voice.as_str(), String::as_str)
    }

    /// Voice used for unmapped languages
    #[must_use]
    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }
}

/// Lowercase and unify `_`/`-` separators (`pt_BR` → `pt-br`)
fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase().replace('_', "-")
}
