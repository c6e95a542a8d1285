//! Frame types and the detector / classifier contracts the procedure consumes.
//!
//! The models themselves live outside this crate. Implementations of
//! [`ObjectDetector`] and [`ActionClassifier`] wrap whatever inference
//! runtime is in use; the orchestrator only sees labels and scores.

pub mod format;

use crate::error::{AssistError, Result};
use std::time::Instant;

pub use format::{NormalizedFrame, letterbox};

/// One RGB8 video frame, row-major, tightly packed.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes.
    pub pixels: Vec<u8>,
    /// When the frame was acquired.
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap raw RGB8 pixels, checking the buffer length.
    ///
    /// # Errors
    ///
    /// Returns an error if `pixels` does not hold exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(AssistError::Detection(format!(
                "frame {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            captured_at: Instant::now(),
        })
    }

    /// An all-black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 3],
            captured_at: Instant::now(),
        }
    }
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// A single labelled detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Detection without a meaningful box (scripted input, tests).
    pub fn labelled(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: BoundingBox::default(),
        }
    }
}

/// Frame-in, detections-out object detector.
pub trait ObjectDetector: Send {
    /// Detect objects in `frame`, most confident first where the model orders them.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Output of one streaming action-classifier step.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPrediction {
    /// Arg-max label for this frame.
    pub label: String,
    /// Probability of `label`.
    pub confidence: f32,
    /// Mode of the recent labels.
    pub smoothed_label: String,
    /// Full probability vector in class order.
    pub probabilities: Vec<f32>,
}

impl ActionPrediction {
    /// Build a prediction from raw logits: softmax, then arg-max.
    ///
    /// Returns `None` when the logits are empty or do not line up with `class_names`.
    pub fn from_logits(class_names: &[String], logits: &[f32]) -> Option<Self> {
        if logits.is_empty() || logits.len() != class_names.len() {
            return None;
        }
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        let probabilities: Vec<f32> = exps.iter().map(|e| e / sum).collect();

        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, p)| {
                if p > acc.1 { (i, p) } else { acc }
            });
        let label = class_names[best].clone();
        Some(Self {
            smoothed_label: label.clone(),
            label,
            confidence,
            probabilities,
        })
    }
}

/// Streaming (stateful) action classifier.
///
/// The classifier carries recurrent state across frames; [`reset_state`]
/// discards it when it is believed stale.
///
/// [`reset_state`]: ActionClassifier::reset_state
pub trait ActionClassifier: Send {
    /// Square input resolution expected by [`predict`](ActionClassifier::predict).
    fn resolution(&self) -> u32;

    /// Convert a raw frame into model input.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be converted.
    fn format(&self, frame: &Frame) -> Result<NormalizedFrame> {
        letterbox(frame, self.resolution())
    }

    /// Run one streaming inference step.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails; callers treat that as "no prediction".
    fn predict(&mut self, input: &NormalizedFrame) -> Result<ActionPrediction>;

    /// Discard the streaming state.
    fn reset_state(&mut self);
}

impl<C: ActionClassifier + ?Sized> ActionClassifier for Box<C> {
    fn resolution(&self) -> u32 {
        (**self).resolution()
    }

    fn format(&self, frame: &Frame) -> Result<NormalizedFrame> {
        (**self).format(frame)
    }

    fn predict(&mut self, input: &NormalizedFrame) -> Result<ActionPrediction> {
        (**self).predict(input)
    }

    fn reset_state(&mut self) {
        (**self).reset_state();
    }
}
