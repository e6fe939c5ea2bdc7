//! Broadcast envelope and payload shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::DocumentPatch;

/// Topic discriminator of a broadcast message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Echo of what was said
    Transcript,
    /// Document fields changed
    DocumentUpdate,
    /// Assistant reply
    Reply,
}

impl Topic {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::DocumentUpdate => "document-update",
            Self::Reply => "reply",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message as delivered to observers
///
/// `seq` increases by one per message within a session; an observer that sees
/// a `seq` it already handled is looking at a redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: String,
    pub seq: u64,
    pub topic: Topic,
    pub payload: Value,
}

/// Who produced a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

/// `transcript` payload
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptMessage<'a> {
    pub text: &'a str,
    pub speaker: Speaker,
    pub language: &'a str,
}

/// `reply` payload
#[derive(Debug, Clone, Serialize)]
pub struct ReplyMessage<'a> {
    pub text: &'a str,
    pub speaker: Speaker,
    pub language: &'a str,
    pub voice: &'a str,
}

/// Origin of a document change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Submitted by the user
    UserUpdate,
    /// Inferred from an assistant reply
    AssistantUpdate,
}

/// `document-update` payload
#[derive(Debug, Clone, Serialize)]
pub struct DocumentUpdateMessage<'a> {
    #[serde(rename = "type")]
    pub source: UpdateSource,
    pub updates: &'a DocumentPatch,
    /// RFC 3339
    pub timestamp: String,
}

impl<'a> DocumentUpdateMessage<'a> {
    /// Stamp a patch with the current time
    #[must_use]
    pub fn now(source: UpdateSource, updates: &'a DocumentPatch) -> Self {
        Self {
            source,
            updates,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::Document;

    #[test]
    fn topic_wire_names() {
        assert_eq!(serde_json::to_value(Topic::Transcript).unwrap(), "transcript");
        assert_eq!(serde_json::to_value(Topic::DocumentUpdate).unwrap(), "document-update");
        assert_eq!(serde_json::to_value(Topic::Reply).unwrap(), "reply");
        assert_eq!(Topic::DocumentUpdate.to_string(), "document-update");
    }

    #[test]
    fn transcript_shape() {
        let v = serde_json::to_value(TranscriptMessage {
            text: "hello",
            speaker: Speaker::User,
            language: "en",
        })
        .unwrap();
        assert_eq!(v, json!({"text": "hello", "speaker": "user", "language": "en"}));
    }

    #[test]
    fn document_update_shape() {
        let mut doc = Document::default();
        let patch = doc.merge(&json!({"budget": {"range": "5k"}}));
        let v = serde_json::to_value(DocumentUpdateMessage::now(UpdateSource::UserUpdate, &patch))
            .unwrap();

        assert_eq!(v["type"], "user_update");
        assert_eq!(v["updates"], json!({"budget": {"range": "5k"}}));
        assert!(
            chrono::DateTime::parse_from_rfc3339(v["timestamp"].as_str().unwrap()).is_ok()
        );
    }
}
