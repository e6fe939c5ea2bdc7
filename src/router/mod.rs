//! Turn routing
//!
//! Every open session gets one worker task that exclusively owns its
//! [`SessionState`]. Events for the session are queued to that worker and
//! processed strictly in arrival order; different sessions run in parallel.
//!
//! ```text
//! voice turn ─┐                     ┌─► transcript ─┐
//!             ├─► Utterance ─► queue ─► worker ─► backend ─► reply ─► broadcaster
//! text msg  ──┘                     └─► document-update ───┘        └─► speech
//! ```

mod fallback;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use fallback::fallback_reply;

use crate::backend::{GenerateRequest, ReplyBackend};
use crate::broadcast::{
    Broadcaster, DocumentUpdateMessage, Envelope, ReplyMessage, SessionChannel, Speaker, Topic,
    TranscriptMessage, UpdateSource,
};
use crate::config::Config;
use crate::session::{DocumentPatch, SessionSnapshot, SessionState, extract_document_update};
use crate::utterance::{InboundEvent, Utterance};
use crate::voice::{SpeechRequest, SpeechSink, VoiceSelector};
use crate::{Error, Result};

/// Result of one processed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Id of the utterance that started the turn
    pub turn_id: Uuid,
    /// Reply text as broadcast and spoken
    pub reply: String,
    /// Effective language of the turn
    pub language: String,
    /// Voice the reply was spoken with
    pub voice: String,
    /// The backend was unavailable and the reply is an apology
    pub fallback: bool,
    /// Document fields changed by the reply
    pub document_changes: usize,
}

/// Pending turn; resolves once the session worker has processed it
#[derive(Debug)]
pub struct TurnTicket {
    turn_id: Uuid,
    session_id: String,
    rx: oneshot::Receiver<Result<TurnOutcome>>,
}

impl TurnTicket {
    #[must_use]
    pub const fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Wait for the turn to finish
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionTerminated` if the session ended before the
    /// turn produced a reply
    pub async fn outcome(self) -> Result<TurnOutcome> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(Error::SessionTerminated(self.session_id)))
    }
}

enum Command {
    Turn {
        utterance: Utterance,
        reply: oneshot::Sender<Result<TurnOutcome>>,
    },
    UpdateDocument {
        partial: Value,
        reply: oneshot::Sender<DocumentPatch>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Dispatch interface of one open session
///
/// Cheap to clone; all clones feed the same worker.
#[derive(Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session has received its end signal
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue a completed voice turn
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyUtterance` for blank text, or
    /// `Error::SessionTerminated` if the session has ended
    pub async fn voice_turn(
        &self,
        text: impl Into<String>,
        language: Option<String>,
    ) -> Result<TurnTicket> {
        self.submit(InboundEvent::Voice {
            text: text.into(),
            language,
        })
        .await
    }

    /// Queue a received text message
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyUtterance` for blank text, or
    /// `Error::SessionTerminated` if the session has ended
    pub async fn text_message(&self, text: impl Into<String>) -> Result<TurnTicket> {
        self.submit(InboundEvent::Text { text: text.into() }).await
    }

    /// Normalize and queue any inbound event
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyUtterance` for blank text, or
    /// `Error::SessionTerminated` if the session has ended
    pub async fn submit(&self, event: InboundEvent) -> Result<TurnTicket> {
        let utterance = Utterance::from_event(&self.id, event)?;
        let turn_id = utterance.id();
        let (reply, rx) = oneshot::channel();
        self.send(Command::Turn { utterance, reply }).await?;

        tracing::debug!(session_id = %self.id, %turn_id, "turn queued");
        Ok(TurnTicket {
            turn_id,
            session_id: self.id.to_string(),
            rx,
        })
    }

    /// Merge a user-submitted partial document update
    ///
    /// Applied in order with the session's turns. Returns the fields that
    /// actually changed.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionTerminated` if the session has ended
    pub async fn update_document(&self, partial: Value) -> Result<DocumentPatch> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::UpdateDocument { partial, reply }).await?;
        rx.await.map_err(|_| self.terminated())
    }

    /// Copy of the session state once every earlier event is processed
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionTerminated` if the session has ended
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.terminated())
    }

    /// Signal the end of the session
    ///
    /// Queued events are discarded. A turn already in flight finishes its
    /// backend attempt but its reply is not applied or broadcast. Once the
    /// worker has stopped the id is released from the router.
    pub fn end(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(session_id = %self.id, "session ending");
            self.cancel.cancel();
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        if self.is_terminated() {
            return Err(self.terminated());
        }
        self.tx.send(command).await.map_err(|_| self.terminated())
    }

    fn terminated(&self) -> Error {
        Error::SessionTerminated(self.id.to_string())
    }
}

/// Collaborators and settings shared by all session workers
struct Shared {
    backend: Arc<dyn ReplyBackend>,
    broadcaster: Arc<Broadcaster>,
    speech: Arc<dyn SpeechSink>,
    voices: VoiceSelector,
    default_language: String,
    greeting: Option<String>,
    queue_depth: usize,
}

type Registry = Arc<RwLock<HashMap<String, SessionHandle>>>;

/// Registry of open sessions and entry point for inbound events
pub struct TurnRouter {
    shared: Arc<Shared>,
    sessions: Registry,
}

impl TurnRouter {
    /// Create a router
    #[must_use]
    pub fn new(
        config: &Config,
        backend: Arc<dyn ReplyBackend>,
        broadcaster: Arc<Broadcaster>,
        speech: Arc<dyn SpeechSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                broadcaster,
                speech,
                voices: VoiceSelector::from_config(&config.voice),
                default_language: config.voice.default_language.clone(),
                greeting: config.session.greeting.clone(),
                queue_depth: config.session.queue_depth.max(1),
            }),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Broadcaster replies and document changes are published on
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.shared.broadcaster
    }

    /// Open a session and start its worker
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionExists` if a session with this id is open
    pub async fn open_session(
        &self,
        id: impl Into<String>,
        language: Option<String>,
    ) -> Result<SessionHandle> {
        let id = id.into();
        let mut sessions = self.sessions.write().await;
        if sessions.get(&id).is_some_and(|h| !h.is_terminated()) {
            return Err(Error::SessionExists(id));
        }

        let state = SessionState::new(
            id.clone(),
            language,
            &self.shared.default_language,
            &self.shared.voices,
        );
        let channel = self.shared.broadcaster.open(&id).await;
        let (tx, rx) = mpsc::channel(self.shared.queue_depth);
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            id: Arc::from(id.as_str()),
            tx,
            cancel: cancel.clone(),
        };

        tracing::info!(
            session_id = %id,
            language = ?state.language(),
            voice = %state.voice(),
            "session opened"
        );

        let worker = SessionWorker {
            shared: Arc::clone(&self.shared),
            registry: Arc::clone(&self.sessions),
            key: Arc::clone(&handle.id),
            channel,
            state,
            cancel,
        };
        tokio::spawn(worker.run(rx));

        sessions.insert(id, handle.clone());
        Ok(handle)
    }

    /// Handle of an open session
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` if no session has this id, or
    /// `Error::SessionTerminated` if it has ended
    pub async fn session(&self, id: &str) -> Result<SessionHandle> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        if handle.is_terminated() {
            return Err(Error::SessionTerminated(id.to_string()));
        }
        Ok(handle.clone())
    }

    /// Follow a session's broadcasts
    ///
    /// The stream ends when the session ends.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` if no session has this id, or
    /// `Error::SessionTerminated` if it has ended
    pub async fn observe(&self, id: &str) -> Result<mpsc::Receiver<Envelope>> {
        let handle = self.session(id).await?;
        match self.shared.broadcaster.subscribe(id).await {
            Some(rx) if !handle.is_terminated() => Ok(rx),
            _ => Err(Error::SessionTerminated(id.to_string())),
        }
    }

    /// Route an inbound event to its session
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound`, `Error::SessionTerminated` or
    /// `Error::EmptyUtterance`
    pub async fn route(&self, session_id: &str, event: InboundEvent) -> Result<TurnTicket> {
        self.session(session_id).await?.submit(event).await
    }

    /// End a session and forget it
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` if no session has this id
    pub async fn close_session(&self, id: &str) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        handle.end();
        Ok(())
    }

    /// Ids of sessions that have not ended
    pub async fn session_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .iter()
            .filter(|(_, h)| !h.is_terminated())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// End every session
    pub async fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.sessions.write().await);
        tracing::info!(count = sessions.len(), "ending all sessions");
        for handle in sessions.values() {
            handle.end();
        }
    }
}

/// Serial executor of one session's events
struct SessionWorker {
    shared: Arc<Shared>,
    registry: Registry,
    /// Identity of the handle this worker serves
    key: Arc<str>,
    channel: SessionChannel,
    state: SessionState,
    cancel: CancellationToken,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        if let Some(greeting) = self.shared.greeting.clone() {
            self.greet(&greeting).await;
        }

        loop {
            let command = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Turn { utterance, reply } => {
                    let outcome = self.turn(utterance).await;
                    let _ = reply.send(outcome);
                }
                Command::UpdateDocument { partial, reply } => {
                    let patch = self.user_update(&partial).await;
                    let _ = reply.send(patch);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.state.snapshot());
                }
            }
        }

        rx.close();
        let discarded = std::iter::from_fn(|| rx.try_recv().ok()).count();
        self.state.terminate();
        self.shared.broadcaster.close(&self.channel).await;
        self.release().await;
        tracing::info!(
            session_id = %self.state.id(),
            turns = self.state.snapshot().turns,
            discarded,
            "session terminated"
        );
    }

    /// Drop this session's registry entry unless the id was reopened
    async fn release(&self) {
        let mut sessions = self.registry.write().await;
        if sessions
            .get(self.state.id())
            .is_some_and(|h| Arc::ptr_eq(&h.id, &self.key))
        {
            sessions.remove(self.state.id());
        }
    }

    async fn greet(&self, greeting: &str) {
        let language = self
            .state
            .effective_language(None, &self.shared.default_language);
        tracing::debug!(session_id = %self.state.id(), "sending greeting");
        self.publish_reply(greeting, &language).await;
        self.speak(greeting, &language).await;
    }

    async fn turn(&mut self, utterance: Utterance) -> Result<TurnOutcome> {
        let session_id = self.state.id().to_string();
        let language = self
            .state
            .effective_language(utterance.language(), &self.shared.default_language);
        self.state.apply_language(&language, &self.shared.voices);
        self.state.record_turn();

        tracing::info!(
            session_id = %session_id,
            turn_id = %utterance.id(),
            channel = %utterance.channel(),
            language = %language,
            "processing turn"
        );

        self.channel
            .publish_message(
                Topic::Transcript,
                &TranscriptMessage {
                    text: utterance.text(),
                    speaker: Speaker::User,
                    language: &language,
                },
            )
            .await;

        let request = GenerateRequest {
            text: utterance.text().to_string(),
            session_id: session_id.clone(),
            language: language.clone(),
            channel: utterance.channel(),
        };
        let generated = self.shared.backend.generate(&request, &self.cancel).await;

        if self.cancel.is_cancelled() {
            tracing::info!(session_id = %session_id, turn_id = %utterance.id(), "session ended mid-turn, dropping reply");
            return Err(Error::SessionTerminated(session_id));
        }

        let (reply, fallback) = match generated {
            Ok(reply) => (reply.into_text(), false),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "no backend reply, apologizing");
                (fallback_reply(&language).to_string(), true)
            }
        };

        let inferred = extract_document_update(&reply);
        let voice = self.state.voice().to_string();

        if !inferred.text.is_empty() {
            self.publish_reply(&inferred.text, &language).await;
        }

        let mut document_changes = 0;
        if let Some(update) = &inferred.update {
            let patch = self.state.merge_document_update(update);
            document_changes = patch.len();
            self.publish_patch(UpdateSource::AssistantUpdate, &patch).await;
        }

        if !inferred.text.is_empty() {
            self.speak(&inferred.text, &language).await;
        }

        Ok(TurnOutcome {
            turn_id: utterance.id(),
            reply: inferred.text,
            language,
            voice,
            fallback,
            document_changes,
        })
    }

    async fn user_update(&mut self, partial: &Value) -> DocumentPatch {
        let patch = self.state.merge_document_update(partial);
        tracing::debug!(session_id = %self.state.id(), changes = patch.len(), "user document update");
        self.publish_patch(UpdateSource::UserUpdate, &patch).await;
        patch
    }

    async fn publish_reply(&self, text: &str, language: &str) {
        self.channel
            .publish_message(
                Topic::Reply,
                &ReplyMessage {
                    text,
                    speaker: Speaker::Agent,
                    language,
                    voice: self.state.voice(),
                },
            )
            .await;
    }

    async fn publish_patch(&self, source: UpdateSource, patch: &DocumentPatch) {
        if patch.is_empty() {
            return;
        }
        self.channel
            .publish_message(
                Topic::DocumentUpdate,
                &DocumentUpdateMessage::now(source, patch),
            )
            .await;
    }

    async fn speak(&self, text: &str, language: &str) {
        let request = SpeechRequest {
            session_id: self.state.id().to_string(),
            text: text.to_string(),
            voice: self.state.voice().to_string(),
            language: language.to_string(),
        };
        if let Err(e) = self.shared.speech.render(&request).await {
            tracing::warn!(session_id = %self.state.id(), error = %e, "speech synthesis failed");
        }
    }
}
