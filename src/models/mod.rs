//! Model loading seams and model file checks.
//!
//! Inference runtimes are plugged in through [`ModelProvider`]. The
//! orchestrator asks for each model only when its stage is reached.

use crate::config::ModelConfig;
use crate::error::{AssistError, Result};
use crate::vision::{ActionClassifier, ObjectDetector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Loads the three vision models.
pub trait ModelProvider: Send {
    /// Detector for the procedure target. Loaded at startup.
    fn target_detector(&mut self) -> Result<Box<dyn ObjectDetector>>;

    /// Detector for the required tools. Loaded when item collection starts.
    fn tool_detector(&mut self) -> Result<Box<dyn ObjectDetector>>;

    /// Streaming action classifier. Loaded when step execution starts.
    fn action_classifier(&mut self) -> Result<Box<dyn ActionClassifier>>;
}

/// Description of the streaming action model, stored next to its weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionModelSpec {
    pub model_id: String,
    pub num_classes: usize,
    /// Square input resolution in pixels.
    pub resolution: u32,
    /// Class names in output order.
    pub class_names: Vec<String>,
}

impl ActionModelSpec {
    /// Parse the model description JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// is internally inconsistent.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec: Self = serde_json::from_str(&content).map_err(|e| {
            AssistError::Model(format!("invalid model config {}: {e}", path.display()))
        })?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        if self.class_names.len() != self.num_classes {
            return Err(AssistError::Model(format!(
                "model declares {} classes but lists {} names",
                self.num_classes,
                self.class_names.len()
            )));
        }
        if self.resolution == 0 {
            return Err(AssistError::Model("model resolution is zero".into()));
        }
        Ok(())
    }

    /// Configured steps the model cannot predict.
    pub fn unknown_steps<'a>(&self, steps: &'a [String]) -> Vec<&'a str> {
        steps
            .iter()
            .filter(|s| !self.class_names.contains(*s))
            .map(String::as_str)
            .collect()
    }
}

/// Configured model files that do not exist.
pub fn missing_model_paths(config: &ModelConfig) -> Vec<PathBuf> {
    config
        .paths()
        .into_iter()
        .filter(|p| !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Fail unless every configured model file exists.
///
/// # Errors
///
/// Returns [`AssistError::Model`] naming every missing file.
pub fn verify_model_paths(config: &ModelConfig) -> Result<()> {
    let missing = missing_model_paths(config);
    if missing.is_empty() {
        info!("all {} model files present", config.paths().len());
        return Ok(());
    }
    for path in &missing {
        warn!("model path not found: {}", path.display());
    }
    let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
    Err(AssistError::Model(format!(
        "model path not found: {}",
        names.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    const SPEC_JSON: &str = r#"{
        "model_id": "a0",
        "num_classes": 3,
        "resolution": 172,
        "class_names": ["loosen_bolts", "lift_car_with_jack", "remove_bolts"]
    }"#;

    #[test]
    fn parses_action_model_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming_model_config.json");
        std::fs::write(&path, SPEC_JSON).unwrap();

        let spec = ActionModelSpec::from_file(&path).unwrap();
        assert_eq!(spec.model_id, "a0");
        assert_eq!(spec.resolution, 172);

        let steps = vec!["loosen_bolts".to_owned(), "lower_car".to_owned()];
        assert_eq!(spec.unknown_steps(&steps), vec!["lower_car"]);
    }

    #[test]
    fn rejects_inconsistent_class_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"model_id": "a0", "num_classes": 2, "resolution": 172, "class_names": ["x"]}"#,
        )
        .unwrap();
        assert!(matches!(
            ActionModelSpec::from_file(&path),
            Err(AssistError::Model(_))
        ));
    }

    #[test]
    fn reports_missing_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("flatV2.pt");
        std::fs::write(&present, b"weights").unwrap();

        let config = ModelConfig {
            target_detector: present,
            tool_detector: dir.path().join("toolsV2.pt"),
            action_weights: dir.path().join("weights.h5"),
            action_config: dir.path().join("config.json"),
        };
        let missing = missing_model_paths(&config);
        assert_eq!(missing.len(), 3);
        assert!(verify_model_paths(&config).is_err());
    }
}
