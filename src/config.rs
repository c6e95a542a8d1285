//! Configuration types for the tire-change assistant.

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Sustained-observation timing shared by the target and tool trackers.
    pub confirmation: ConfirmationConfig,
    /// Object detection settings (target and tool stages).
    pub detection: DetectionConfig,
    /// Action step validation settings.
    pub action: ActionConfig,
    /// Microphone capture settings.
    pub audio: AudioConfig,
    /// Voice question-answering settings.
    pub assistant: AssistantConfig,
    /// Model file locations.
    pub models: ModelConfig,
}

/// Timing of the stable-observation tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Seconds of sustained presence required before confirming.
    pub validation_duration_secs: f64,
    /// Longest tolerated absence, in seconds, before progress is discarded.
    pub grace_period_secs: f64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            validation_duration_secs: 5.0,
            grace_period_secs: 2.5,
        }
    }
}

/// Longest accepted confirmation window or grace period, in seconds.
pub const MAX_CONFIRMATION_SECS: f64 = 3_600.0;

/// Longest accepted poll or join timeout, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

impl ConfirmationConfig {
    /// Validation window as a [`Duration`].
    ///
    /// Values that fail [`AssistConfig::validate`] are clamped rather than
    /// panicking: non-positive or NaN becomes zero, overflow saturates.
    pub fn validation_duration(&self) -> Duration {
        secs_to_duration(self.validation_duration_secs)
    }

    /// Grace period as a [`Duration`], clamped like [`validation_duration`](Self::validation_duration).
    pub fn grace_period(&self) -> Duration {
        secs_to_duration(self.grace_period_secs)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Object detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detector label that identifies the procedure target.
    pub target_label: String,
    /// Tool labels that must all be confirmed before the steps begin.
    pub required_tools: Vec<String>,
    /// Detections below this confidence are ignored.
    pub confidence_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_label: "Flat_tire".to_owned(),
            required_tools: vec!["Car_Jack".to_owned(), "Wheel_Wrench".to_owned()],
            confidence_threshold: 0.6,
        }
    }
}

/// Action step validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Ordered classifier labels, one per procedure step.
    pub steps: Vec<String>,
    /// Net matching predictions required to complete a step.
    pub validation_frames: u32,
    /// Minimum confidence for a prediction to count towards a step.
    pub confidence_threshold: f32,
    /// A confidence fall of at least this much on the expected label resets
    /// the classifier's streaming state.
    pub confidence_drop_reset: f32,
    /// Number of recent labels used for smoothing (0 or 1 disables).
    pub smoothing_window: usize,
    /// How long shutdown waits for the classification worker, in ms.
    pub worker_join_timeout_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            validation_frames: 15,
            confidence_threshold: 0.6,
            confidence_drop_reset: 0.05,
            smoothing_window: 15,
            worker_join_timeout_ms: 2_000,
        }
    }
}

impl ActionConfig {
    /// Worker join timeout as a [`Duration`].
    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

fn default_steps() -> Vec<String> {
    [
        "loosen_bolts",
        "lift_car_with_jack",
        "remove_bolts",
        "remove_tire",
        "place_spare_tire",
        "hand_tighten_bolts",
        "initial_wrench_tighten",
        "lower_car",
        "tighten_bolts",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

/// Microphone capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate delivered to the recognizer, in Hz.
    pub sample_rate: u32,
    /// Samples per block handed to the recognizer.
    pub block_size: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Capture queue poll timeout in ms; bounds how quickly `stop()` lands.
    pub poll_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            block_size: 8_000,
            input_device: None,
            poll_timeout_ms: 1_000,
        }
    }
}

impl AudioConfig {
    /// Poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Voice question-answering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Whether the voice channel runs alongside the procedure.
    pub enabled: bool,
    /// JSON file of `{intent, answer, examples}` entries.
    pub faq_path: PathBuf,
    /// Spoken once when the voice channel starts.
    pub greeting: String,
    /// Answer used when the classified intent has no FAQ entry.
    pub fallback_answer: String,
    /// Response queue poll timeout in ms.
    pub dispatch_poll_timeout_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            faq_path: PathBuf::from("faq.json"),
            greeting: "Hello! I'm your tire change assistant. How can I help?".to_owned(),
            fallback_answer:
                "I'm not sure how to answer that. Please ask about tire changing steps.".to_owned(),
            dispatch_poll_timeout_ms: 1_000,
        }
    }
}

impl AssistantConfig {
    /// Dispatcher poll timeout as a [`Duration`].
    pub fn dispatch_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_timeout_ms)
    }
}

/// Model file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Target (flat tire) detector weights.
    pub target_detector: PathBuf,
    /// Tool detector weights.
    pub tool_detector: PathBuf,
    /// Streaming action classifier weights.
    pub action_weights: PathBuf,
    /// Action classifier model description (JSON).
    pub action_config: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            target_detector: PathBuf::from("flatV2.pt"),
            tool_detector: PathBuf::from("toolsV2.pt"),
            action_weights: PathBuf::from("Streaming/streaming_movinet_weights.h5"),
            action_config: PathBuf::from("Streaming/streaming_model_config.json"),
        }
    }
}

impl ModelConfig {
    /// All configured model paths, in load order.
    pub fn paths(&self) -> [&Path; 4] {
        [
            &self.target_detector,
            &self.tool_detector,
            &self.action_weights,
            &self.action_config,
        ]
    }
}

impl AssistConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AssistError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AssistError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/tire-assist/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("tire-assist").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("tire-assist")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/tire-assist-config/config.toml")
        }
    }

    /// Reject values the procedure cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let c = &self.confirmation;
        check_window(
            "confirmation.validation_duration_secs",
            c.validation_duration_secs,
        )?;
        check_window("confirmation.grace_period_secs", c.grace_period_secs)?;
        if self.detection.target_label.trim().is_empty() {
            return Err(AssistError::Config(
                "detection.target_label is empty".into(),
            ));
        }
        check_unit_interval(
            "detection.confidence_threshold",
            self.detection.confidence_threshold,
        )?;
        if self.action.steps.is_empty() {
            return Err(AssistError::Config("action.steps is empty".into()));
        }
        if self.action.validation_frames == 0 {
            return Err(AssistError::Config(
                "action.validation_frames must be at least 1".into(),
            ));
        }
        check_unit_interval(
            "action.confidence_threshold",
            self.action.confidence_threshold,
        )?;
        check_unit_interval(
            "action.confidence_drop_reset",
            self.action.confidence_drop_reset,
        )?;
        if self.audio.sample_rate == 0 || self.audio.block_size == 0 {
            return Err(AssistError::Config(
                "audio.sample_rate and audio.block_size must be non-zero".into(),
            ));
        }
        if self.audio.poll_timeout_ms == 0 || self.assistant.dispatch_poll_timeout_ms == 0 {
            return Err(AssistError::Config("poll timeouts must be non-zero".into()));
        }
        for (name, ms) in [
            ("audio.poll_timeout_ms", self.audio.poll_timeout_ms),
            (
                "assistant.dispatch_poll_timeout_ms",
                self.assistant.dispatch_poll_timeout_ms,
            ),
            ("action.worker_join_timeout_ms", self.action.worker_join_timeout_ms),
        ] {
            if ms > MAX_TIMEOUT_MS {
                return Err(AssistError::Config(format!(
                    "{name} must be at most {MAX_TIMEOUT_MS}, got {ms}"
                )));
            }
        }
        Ok(())
    }
}

fn check_window(name: &str, secs: f64) -> Result<()> {
    if secs.is_finite() && secs > 0.0 && secs <= MAX_CONFIRMATION_SECS {
        Ok(())
    } else {
        Err(AssistError::Config(format!(
            "{name} must be within (0, {MAX_CONFIRMATION_SECS}], got {secs}"
        )))
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AssistError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}
