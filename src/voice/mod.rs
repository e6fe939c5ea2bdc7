//! Voice handling
//!
//! Chooses the synthesis voice for a session's language and relays reply
//! text to the external speech synthesis service.

mod selector;
pub mod speech;

pub use selector::VoiceSelector;
pub use speech::{HttpSpeech, NoSpeech, SpeechRequest, SpeechSink};
