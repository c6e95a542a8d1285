//! Intent classification and answer lookup.

use crate::assistant::{FaqBook, IntentClassifier, IntentMatch};
use crate::error::Result;
use crate::pipeline::messages::Utterance;
use std::collections::BTreeSet;
use tracing::info;

/// Intent reported when nothing matches.
pub const UNKNOWN_INTENT: &str = "unknown";

const PUNCTUATION: [char; 5] = ['?', '.', '!', ',', '¿'];

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "be", "can", "do", "does", "i", "is", "it", "me", "my", "of", "on",
    "should", "the", "to", "you",
];

/// Normalize text before classification.
///
/// Lowercases, puts spaces around `? . ! , ¿`, replaces every other
/// non-letter run with a single space, and trims.
pub fn preprocess_text(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len() + 8);
    for c in text.to_lowercase().chars() {
        if PUNCTUATION.contains(&c) {
            spaced.push(' ');
            spaced.push(c);
            spaced.push(' ');
        } else if c.is_ascii_alphabetic() {
            spaced.push(c);
        } else {
            spaced.push(' ');
        }
    }
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn keywords(text: &str) -> BTreeSet<String> {
    preprocess_text(text)
        .split_whitespace()
        .filter(|w| w.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_owned)
        .collect()
}

/// Scores intents by word overlap with their FAQ examples.
#[derive(Debug, Clone)]
pub struct KeywordIntentClassifier {
    intents: Vec<(String, BTreeSet<String>)>,
}

impl KeywordIntentClassifier {
    /// Build keyword sets from each entry's examples and intent name.
    pub fn from_faq(faq: &FaqBook) -> Self {
        let intents = faq
            .entries()
            .iter()
            .map(|entry| {
                let mut words = keywords(&entry.intent.replace('_', " "));
                for example in &entry.examples {
                    words.extend(keywords(example));
                }
                (entry.intent.clone(), words)
            })
            .collect();
        Self { intents }
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&mut self, text: &str) -> Result<IntentMatch> {
        let words = keywords(text);
        let mut best: Option<(&str, usize)> = None;
        for (intent, vocabulary) in &self.intents {
            let overlap = words.intersection(vocabulary).count();
            if overlap > 0 && best.is_none_or(|(_, b)| overlap > b) {
                best = Some((intent.as_str(), overlap));
            }
        }

        Ok(match best {
            #[allow(clippy::cast_precision_loss)]
            Some((intent, overlap)) => IntentMatch {
                intent: intent.to_owned(),
                probability: overlap as f32 / words.len() as f32,
            },
            None => IntentMatch {
                intent: UNKNOWN_INTENT.to_owned(),
                probability: 0.0,
            },
        })
    }
}

/// What the assistant will say back.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentReply {
    pub intent: String,
    pub probability: f32,
    pub answer: String,
}

/// Classifies utterances and looks up their answers.
pub struct IntentResponder {
    faq: FaqBook,
    classifier: Box<dyn IntentClassifier>,
    fallback: String,
}

impl IntentResponder {
    pub fn new(
        faq: FaqBook,
        classifier: Box<dyn IntentClassifier>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            faq,
            classifier,
            fallback: fallback.into(),
        }
    }

    /// Responder using keyword matching over the FAQ's own examples.
    pub fn keyword(faq: FaqBook, fallback: impl Into<String>) -> Self {
        let classifier = KeywordIntentClassifier::from_faq(&faq);
        Self::new(faq, Box::new(classifier), fallback)
    }

    /// Classify `utterance` and pick the answer, falling back when the
    /// intent has no FAQ entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent classifier fails.
    pub fn respond(&mut self, utterance: Utterance) -> Result<IntentReply> {
        let IntentMatch {
            intent,
            probability,
        } = self.classifier.classify(&utterance.text)?;
        let answer = self
            .faq
            .answer_for(&intent)
            .unwrap_or(self.fallback.as_str())
            .to_owned();
        info!(
            "intent '{intent}' ({:.2}% confidence) for '{}'",
            probability * 100.0,
            utterance.text
        );
        Ok(IntentReply {
            intent,
            probability,
            answer,
        })
    }
}
