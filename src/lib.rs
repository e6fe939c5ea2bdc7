//! Brief Gateway - turn routing and state broadcast for briefing sessions
//!
//! This library provides the core of the brief gateway:
//! - Normalizing voice turns and text messages into one utterance shape
//! - Serial per-session processing against a streaming reply backend
//! - Language-driven voice selection
//! - A co-edited production brief document
//! - Ordered fan-out of transcripts, replies and document changes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Transport (rooms, STT, UI)              │
//! │     voice turns  │  text messages  │  observers      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP / WebSocket
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Brief Gateway                       │
//! │   Turn Router  │  Session State  │  Broadcaster      │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │ streaming POST              │ render
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │   Reply backend     │       │   Speech synthesis    │
//! └─────────────────────┘       └───────────────────────┘
//! ```

pub mod api;
pub mod backend;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod router;
pub mod session;
pub mod utterance;
pub mod voice;

pub use backend::{BackendClient, BackendReply, GenerateRequest, ReplyBackend, RetryPolicy};
pub use broadcast::{Broadcaster, Envelope, SessionChannel, Topic};
pub use config::Config;
pub use error::{Error, Result};
pub use router::{SessionHandle, TurnOutcome, TurnRouter, TurnTicket};
pub use session::{Document, DocumentPatch, SessionPhase, SessionSnapshot, SessionState};
pub use utterance::{InboundEvent, InputChannel, Utterance};
pub use voice::{SpeechSink, VoiceSelector};
