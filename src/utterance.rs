//! Inbound events and their normalized form
//!
//! Voice turns and text messages arrive in different shapes; both become an
//! [`Utterance`] before they touch session state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Channel an utterance arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputChannel {
    /// Recognized speech
    Voice,
    /// Typed chat message
    Text,
}

impl InputChannel {
    /// Wire name, as sent to the backend in `user_context.input_type`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event produced by the transport layer for one session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum InboundEvent {
    /// Voice turn completed by speech recognition
    Voice {
        text: String,
        /// Language detected by recognition, if any
        #[serde(default)]
        language: Option<String>,
    },
    /// Text message received on the data channel
    Text { text: String },
}

/// One normalized unit of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    id: Uuid,
    session_id: String,
    channel: InputChannel,
    text: String,
    language: Option<String>,
}

impl Utterance {
    /// Normalize an inbound event for `session_id`
    ///
    /// Text is trimmed; a blank declared language counts as undeclared.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyUtterance` if the text is blank
    pub fn from_event(session_id: &str, event: InboundEvent) -> Result<Self> {
        let (channel, text, language) = match event {
            InboundEvent::Voice { text, language } => (InputChannel::Voice, text, language),
            InboundEvent::Text { text } => (InputChannel::Text, text, None),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyUtterance);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            channel,
            text: text.to_string(),
            language: language
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
        })
    }

    /// Unique id of this utterance (the turn id)
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub const fn channel(&self) -> InputChannel {
        self.channel
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Language declared by the event itself
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}
