//! Message types passed between the worker threads.

use crate::vision::Frame;
use std::time::Instant;

/// A block of captured microphone audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// 16-bit mono PCM.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// When the block was completed.
    pub captured_at: Instant,
}

/// A recognized utterance, consumed once by the intent classifier.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub recognized_at: Instant,
}

/// Where a spoken response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Greeting,
    Answer,
}

/// Text queued for speech output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub text: String,
    pub source: ResponseSource,
}

impl ResponseMessage {
    pub fn greeting(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: ResponseSource::Greeting,
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: ResponseSource::Answer,
        }
    }
}

/// Request slot contents for the classification worker.
#[derive(Debug)]
pub enum BridgeRequest {
    /// Classify this frame. The frame is moved to the worker.
    Classify(Frame),
    /// Exit the worker loop.
    Shutdown,
}
