//! Error types for the tire-change assistant.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// Object detection failed for a frame.
    #[error("detection error: {0}")]
    Detection(String),

    /// Action classification (formatting or inference) failed.
    #[error("classification error: {0}")]
    Classification(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition error.
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Intent classification error.
    #[error("intent error: {0}")]
    Intent(String),

    /// Speech output error.
    #[error("speech error: {0}")]
    Speech(String),

    /// Model file missing or failed to load.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Worker or orchestration error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistError>;
