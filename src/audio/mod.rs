//! Microphone capture via cpal.

pub mod capture;

pub use capture::{CaptureGuard, ChunkAccumulator, CpalCapture};
