//! Voice question answering that runs beside the procedure.
//!
//! A listener thread turns microphone audio into recognized utterances,
//! classifies each one into an FAQ intent, and queues the canned answer.
//! A dispatcher thread speaks queued answers one at a time.

pub mod dispatch;
pub mod faq;
pub mod intent;
pub mod listener;

pub use dispatch::{ConsoleSynthesizer, ResponseDispatcher};
pub use faq::{FaqBook, FaqEntry};
pub use intent::{IntentReply, IntentResponder, KeywordIntentClassifier, preprocess_text};
pub use listener::AudioIntentPipeline;

use crate::error::Result;
use crate::pipeline::messages::AudioChunk;

/// Streaming speech-to-text engine.
pub trait SpeechRecognizer: Send {
    /// Feed one audio block. Returns `true` when an utterance just completed.
    fn accept(&mut self, chunk: &AudioChunk) -> Result<bool>;

    /// Take the text of the completed utterance.
    fn take_text(&mut self) -> Result<String>;
}

/// Best intent for a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentMatch {
    pub intent: String,
    pub probability: f32,
}

/// Text-to-intent model.
pub trait IntentClassifier: Send {
    fn classify(&mut self, text: &str) -> Result<IntentMatch>;
}

/// Blocking speech output, shared between the dispatcher thread and its owner.
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, returning when playback finishes or is halted.
    fn speak(&self, text: &str) -> Result<()>;

    /// Interrupt any utterance in progress.
    fn halt(&self);
}
