//! Speech synthesis relay
//!
//! Rendering text to audio is owned by an external synthesis service; the
//! gateway only hands it the reply text and the voice to use.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Text to render as speech for one session
#[derive(Debug, Clone, Serialize)]
pub struct SpeechRequest {
    pub session_id: String,
    pub text: String,
    pub voice: String,
    pub language: String,
}

/// Renders text as speech
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Submit text for synthesis
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis service rejects or cannot be reached
    async fn render(&self, request: &SpeechRequest) -> Result<()>;
}

/// Speech sink that drops everything (speech disabled)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeech;

#[async_trait]
impl SpeechSink for NoSpeech {
    async fn render(&self, request: &SpeechRequest) -> Result<()> {
        tracing::trace!(session_id = %request.session_id, "speech disabled, skipping");
        Ok(())
    }
}

/// Forwards speech requests to an HTTP synthesis service
pub struct HttpSpeech {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSpeech {
    /// Create a relay for the given endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is empty
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Config("speech endpoint URL is empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        })
    }
}

#[async_trait]
impl SpeechSink for HttpSpeech {
    async fn render(&self, request: &SpeechRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Speech(format!("synthesis error {status}: {body}")));
        }

        tracing::debug!(
            session_id = %request.session_id,
            voice = %request.voice,
            chars = request.text.len(),
            "speech submitted"
        );
        Ok(())
    }
}

/// Build the speech sink described by configuration
///
/// # Errors
///
/// Returns error if a configured endpoint is invalid
pub fn from_config(config: &SpeechConfig) -> Result<Box<dyn SpeechSink>> {
    match &config.url {
        Some(url) => Ok(Box::new(HttpSpeech::new(url.clone(), config.timeout)?)),
        None => {
            tracing::info!("no speech endpoint configured, replies will not be spoken");
            Ok(Box::new(NoSpeech))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_endpoint() {
        assert!(HttpSpeech::new("  ", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn request_serializes_all_fields() {
        let request = SpeechRequest {
            session_id: "s-1".to_string(),
            text: "Hello".to_string(),
            voice: "voice-en".to_string(),
            language: "en".to_string(),
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["session_id"], "s-1");
        assert_eq!(v["text"], "Hello");
        assert_eq!(v["voice"], "voice-en");
        assert_eq!(v["language"], "en");
    }

    #[tokio::test]
    async fn no_speech_accepts_everything() {
        let request = SpeechRequest {
            session_id: "s-1".to_string(),
            text: "Hello".to_string(),
            voice: "v".to_string(),
            language: "en".to_string(),
        };
        tokio_test::assert_ok!(NoSpeech.render(&request).await);
    }
}
