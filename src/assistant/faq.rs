//! Canned answers keyed by intent.

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One FAQ entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub intent: String,
    pub answer: String,
    /// Example questions for this intent.
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FaqBook {
    entries: Vec<FaqEntry>,
}

impl FaqBook {
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        Self { entries }
    }

    /// Load a JSON array of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, is not valid JSON, or holds no entries.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistError::Intent(format!("cannot read FAQ file {}: {e}", path.display()))
        })?;
        let entries: Vec<FaqEntry> = serde_json::from_str(&content)
            .map_err(|e| AssistError::Intent(format!("invalid FAQ file {}: {e}", path.display())))?;
        if entries.is_empty() {
            return Err(AssistError::Intent(format!(
                "FAQ file {} has no entries",
                path.display()
            )));
        }
        info!("loaded {} FAQ entries from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Answer for `intent`. The first entry wins if an intent is repeated.
    pub fn answer_for(&self, intent: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.intent == intent)
            .map(|e| e.answer.as_str())
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn loads_entries_and_looks_up_answers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faq.json");
        std::fs::write(
            &path,
            r#"[
                {"intent": "jack_position", "answer": "Place the jack under the frame.", "examples": ["where does the jack go"]},
                {"intent": "bolt_order", "answer": "Tighten in a star pattern."}
            ]"#,
        )
        .unwrap();

        let faq = FaqBook::from_file(&path).unwrap();
        assert_eq!(faq.len(), 2);
        assert_eq!(
            faq.answer_for("bolt_order"),
            Some("Tighten in a star pattern.")
        );
        assert!(faq.entries()[1].examples.is_empty());
        assert_eq!(faq.answer_for("weather"), None);
    }

    #[test]
    fn missing_or_empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FaqBook::from_file(&dir.path().join("missing.json")).is_err());

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert!(matches!(
            FaqBook::from_file(&empty),
            Err(AssistError::Intent(_))
        ));
    }
}
