//! Streaming text-generation backend client
//!
//! One generation is a POST whose response streams newline-delimited frames
//! (see [`frame`]). Failed attempts are retried from scratch with linear
//! backoff (see [`retry`]); partial text from a failed attempt is discarded.

pub mod frame;
pub mod retry;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use frame::{LineDecoder, ReplyAssembler, decode_frame};
pub use retry::{AttemptError, RetryPolicy, is_recoverable};

use crate::Result;
use crate::config::BackendConfig;
use crate::utterance::InputChannel;

/// What to generate a reply for
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// User text
    pub text: String,
    /// Conversation thread (session id)
    pub session_id: String,
    /// Effective language of the turn
    pub language: String,
    /// Channel the text arrived on
    pub channel: InputChannel,
}

/// Reply text assembled from one completed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    text: String,
    fragments: usize,
    attempts: u32,
}

impl BackendReply {
    #[must_use]
    pub fn new(text: impl Into<String>, fragments: usize, attempts: u32) -> Self {
        Self {
            text: text.into(),
            fragments,
            attempts,
        }
    }

    /// Reply text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fragments that made up the reply
    #[must_use]
    pub const fn fragments(&self) -> usize {
        self.fragments
    }

    /// Attempts it took to obtain the reply
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consume the reply, returning its text
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Produces assistant replies
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    /// Generate a reply, giving up once `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` when no reply could be obtained
    async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendReply>;
}

/// Request body sent to the backend
#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    message: &'a str,
    thread_id: &'a str,
    user_context: UserContext<'a>,
}

#[derive(Debug, Serialize)]
struct UserContext<'a> {
    input_type: &'a str,
    language: &'a str,
    source: &'a str,
}

/// HTTP client for the streaming backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    url: String,
    source: String,
    policy: RetryPolicy,
}

impl BackendClient {
    /// Create a client from configuration
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            source: config.source.clone(),
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Default retry policy of this client
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate a reply under an explicit retry policy
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` once attempts are exhausted, on a
    /// non-retryable HTTP status, or when cancelled
    pub async fn generate_with(
        &self,
        request: &GenerateRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<BackendReply> {
        let body = StreamRequest {
            message: &request.text,
            thread_id: &request.session_id,
            user_context: UserContext {
                input_type: request.channel.as_str(),
                language: &request.language,
                source: &self.source,
            },
        };
        let body = &body;

        let ((text, fragments), attempts) = retry::retry(policy, cancel, |attempt| {
            tracing::info!(
                thread_id = %request.session_id,
                language = %request.language,
                input_type = %request.channel,
                attempt,
                "calling backend"
            );
            self.stream_once(body)
        })
        .await?;

        tracing::debug!(
            thread_id = %request.session_id,
            attempts,
            fragments,
            chars = text.len(),
            "backend reply complete"
        );

        Ok(BackendReply::new(text, fragments, attempts))
    }

    /// One attempt: open the stream and read it to the end
    async fn stream_once(
        &self,
        body: &StreamRequest<'_>,
    ) -> std::result::Result<(String, usize), AttemptError> {
        let response = self
            .client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!("backend returned {status}: {detail}");
            return Err(if is_recoverable(status.as_u16()) {
                AttemptError::Transient(message)
            } else {
                AttemptError::Permanent(message)
            });
        }

        let mut assembler = ReplyAssembler::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| AttemptError::Transient(format!("stream interrupted: {e}")))?;
            assembler.feed(&chunk);
        }

        Ok(assembler.finish())
    }
}

#[async_trait]
impl ReplyBackend for BackendClient {
    async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendReply> {
        self.generate_with(request, &self.policy, cancel).await
    }
}
