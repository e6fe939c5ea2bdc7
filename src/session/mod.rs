//! Per-session conversational state
//!
//! A `SessionState` is owned by exactly one session worker (see
//! [`crate::router`]) and is never shared; it does no locking of its own.

pub mod document;
pub mod inference;

use serde::Serialize;
use serde_json::Value;

pub use document::{Document, DocumentPatch, FieldValue, MAX_LIST_ITEMS};
pub use inference::{InferredReply, extract_document_update};

use crate::voice::VoiceSelector;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Created, no utterance processed yet
    Idle,
    /// At least one turn processed
    Active,
    /// End signal received; accepts nothing further
    Terminated,
}

/// Mutable state of one conversation
#[derive(Debug)]
pub struct SessionState {
    id: String,
    language: Option<String>,
    voice: String,
    phase: SessionPhase,
    turns: u64,
    document: Document,
}

/// Immutable copy of a session's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub language: Option<String>,
    pub voice: String,
    pub phase: SessionPhase,
    pub turns: u64,
    pub document: Document,
}

impl SessionState {
    /// Create an idle session
    ///
    /// The voice follows `language`, or `default_language` while the session
    /// has none.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        language: Option<String>,
        default_language: &str,
        voices: &VoiceSelector,
    ) -> Self {
        let language = language.filter(|l| !l.trim().is_empty());
        let voice = voices
            .resolve(language.as_deref().unwrap_or(default_language))
            .to_string();

        Self {
            id: id.into(),
            language,
            voice,
            phase: SessionPhase::Idle,
            turns: 0,
            document: Document::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Active language, if one was ever established
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Effective language for a turn: declared, else current, else default
    #[must_use]
    pub fn effective_language(&self, declared: Option<&str>, default_language: &str) -> String {
        declared
            .or(self.language.as_deref())
            .unwrap_or(default_language)
            .to_string()
    }

    /// Record `tag` as the active language, re-deriving the voice
    ///
    /// Returns `true` if the voice changed.
    pub fn apply_language(&mut self, tag: &str, voices: &VoiceSelector) -> bool {
        let voice = voices.resolve(tag);
        let changed = voice != self.voice;
        if changed {
            tracing::info!(session_id = %self.id, language = %tag, voice, "voice changed");
            self.voice = voice.to_string();
        }
        self.language = Some(tag.to_string());
        changed
    }

    /// Merge a partial document update; see [`Document::merge`]
    pub fn merge_document_update(&mut self, partial: &Value) -> DocumentPatch {
        self.document.merge(partial)
    }

    /// Count a processed turn, moving `Idle` to `Active`
    pub fn record_turn(&mut self) {
        if self.phase == SessionPhase::Terminated {
            return;
        }
        self.turns += 1;
        self.phase = SessionPhase::Active;
    }

    /// Move to `Terminated`; there is no way back
    pub fn terminate(&mut self) {
        self.phase = SessionPhase::Terminated;
    }

    /// Immutable copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            language: self.language.clone(),
            voice: self.voice.clone(),
            phase: self.phase,
            turns: self.turns,
            document: self.document.clone(),
        }
    }
}
