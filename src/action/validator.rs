//! Hysteresis counter that walks an ordered list of action steps.
//!
//! Each matching, confident prediction moves the counter up by one and
//! anything else moves it down by one (never below zero). A step completes
//! when the counter reaches the configured number of frames.

use crate::config::ActionConfig;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one [`ActionStepValidator::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Still on the current step with `count` net matching frames.
    InProgress { count: u32 },
    /// The current step finished; `next_index` is now expected.
    StepCompleted { next_index: usize },
    /// Every step is done. Terminal.
    ProcedureCompleted,
}

/// Status plus whether the classifier's streaming state should be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub reset_classifier: bool,
}

/// Raw progress counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionProgress {
    /// Index of the expected step; equal to the step count once finished.
    pub step_index: usize,
    /// Net matching predictions on the current step.
    pub validation_count: u32,
    /// Confidence of the previous prediction, whatever its label.
    pub last_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct ActionStepValidator {
    steps: Vec<String>,
    validation_frames: u32,
    confidence_threshold: f32,
    confidence_drop_reset: f32,
    progress: ActionProgress,
    step_started_at: Option<Instant>,
}

impl ActionStepValidator {
    pub fn new(config: &ActionConfig) -> Self {
        Self {
            steps: config.steps.clone(),
            validation_frames: config.validation_frames.max(1),
            confidence_threshold: config.confidence_threshold,
            confidence_drop_reset: config.confidence_drop_reset,
            progress: ActionProgress::default(),
            step_started_at: None,
        }
    }

    /// Feed one prediction.
    pub fn update(&mut self, label: &str, confidence: f32, now: Instant) -> StepUpdate {
        let Some(expected) = self.steps.get(self.progress.step_index) else {
            return StepUpdate {
                status: StepStatus::ProcedureCompleted,
                reset_classifier: false,
            };
        };
        self.step_started_at.get_or_insert(now);

        let matches = label == expected;
        let fall = self.progress.last_confidence - confidence;
        let mut reset_classifier = matches && fall >= self.confidence_drop_reset;
        if reset_classifier {
            debug!("confidence on {label} dropped by {fall:.2}, resetting classifier state");
        }
        self.progress.last_confidence = confidence;

        if !(matches && confidence >= self.confidence_threshold) {
            self.progress.validation_count = self.progress.validation_count.saturating_sub(1);
            return StepUpdate {
                status: StepStatus::InProgress {
                    count: self.progress.validation_count,
                },
                reset_classifier,
            };
        }

        self.progress.validation_count = self.progress.validation_count.saturating_add(1);
        if self.progress.validation_count < self.validation_frames {
            return StepUpdate {
                status: StepStatus::InProgress {
                    count: self.progress.validation_count,
                },
                reset_classifier,
            };
        }

        if let Some(started) = self.step_started_at.take() {
            info!(
                "step {} ({expected}) completed in {:.1}s",
                self.progress.step_index + 1,
                now.saturating_duration_since(started).as_secs_f64()
            );
        }
        self.progress.step_index += 1;
        self.progress.validation_count = 0;

        if self.is_complete() {
            info!("all {} steps completed", self.steps.len());
            return StepUpdate {
                status: StepStatus::ProcedureCompleted,
                reset_classifier: false,
            };
        }

        self.progress.last_confidence = 0.0;
        reset_classifier = true;
        if let Some(next) = self.current_step() {
            info!("starting action validation for: {next}");
        }
        StepUpdate {
            status: StepStatus::StepCompleted {
                next_index: self.progress.step_index,
            },
            reset_classifier,
        }
    }

    /// Operator reset: clear the counter on the current step.
    ///
    /// Returns whether the classifier state should be reset (false once complete).
    pub fn reset_progress(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.progress.validation_count = 0;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.progress.step_index >= self.steps.len()
    }

    /// Label expected next, `None` once complete.
    pub fn current_step(&self) -> Option<&str> {
        self.steps.get(self.progress.step_index).map(String::as_str)
    }

    pub fn progress(&self) -> &ActionProgress {
        &self.progress
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn validation_frames(&self) -> u32 {
        self.validation_frames
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn validator() -> ActionStepValidator {
        ActionStepValidator::new(&ActionConfig::default())
    }

    #[test]
    fn fifteen_matches_complete_a_step_once() {
        let mut v = validator();
        let now = Instant::now();
        for i in 1..15 {
            let u = v.update("loosen_bolts", 0.9, now);
            assert_eq!(u.status, StepStatus::InProgress { count: i });
        }
        let u = v.update("loosen_bolts", 0.9, now);
        assert_eq!(u.status, StepStatus::StepCompleted { next_index: 1 });
        assert!(u.reset_classifier);
        assert_eq!(v.progress().validation_count, 0);
        assert_eq!(v.current_step(), Some("lift_car_with_jack"));

        // The old label no longer counts.
        let u = v.update("loosen_bolts", 0.9, now);
        assert_eq!(u.status, StepStatus::InProgress { count: 0 });
    }

    #[test]
    fn a_mismatch_delays_completion() {
        let mut v = validator();
        let now = Instant::now();
        for _ in 0..14 {
            v.update("loosen_bolts", 0.9, now);
        }
        let u = v.update("remove_tire", 0.9, now);
        assert_eq!(u.status, StepStatus::InProgress { count: 13 });

        let u = v.update("loosen_bolts", 0.9, now);
        assert_eq!(u.status, StepStatus::InProgress { count: 14 });
        let u = v.update("loosen_bolts", 0.9, now);
        assert_eq!(u.status, StepStatus::StepCompleted { next_index: 1 });
    }

    #[test]
    fn low_confidence_counts_as_a_miss() {
        let mut v = validator();
        let now = Instant::now();
        v.update("loosen_bolts", 0.9, now);
        let u = v.update("loosen_bolts", 0.59, now);
        assert_eq!(u.status, StepStatus::InProgress { count: 0 });
        let u = v.update("loosen_bolts", 0.59, now);
        assert_eq!(u.status, StepStatus::InProgress { count: 0 });
    }

    #[test]
    fn significant_confidence_drop_requests_one_reset() {
        let mut v = validator();
        let now = Instant::now();
        let first = v.update("loosen_bolts", 0.80, now);
        let second = v.update("loosen_bolts", 0.74, now);
        assert!(!first.reset_classifier);
        assert!(second.reset_classifier);
        // The counter is untouched by the reset signal.
        assert_eq!(second.status, StepStatus::InProgress { count: 2 });
    }

    #[test]
    fn small_confidence_drop_is_ignored() {
        let mut v = validator();
        let now = Instant::now();
        assert!(!v.update("loosen_bolts", 0.80, now).reset_classifier);
        assert!(!v.update("loosen_bolts", 0.77, now).reset_classifier);
    }

    #[test]
    fn drop_on_another_label_is_ignored() {
        let mut v = validator();
        let now = Instant::now();
        v.update("remove_tire", 0.95, now);
        assert!(!v.update("remove_tire", 0.50, now).reset_classifier);
    }

    #[test]
    fn manual_reset_clears_count_but_keeps_step() {
        let mut v = validator();
        let now = Instant::now();
        for _ in 0..15 {
            v.update("loosen_bolts", 0.9, now);
        }
        for _ in 0..7 {
            v.update("lift_car_with_jack", 0.9, now);
        }
        assert!(v.reset_progress());
        assert_eq!(v.progress().validation_count, 0);
        assert_eq!(v.progress().step_index, 1);
    }

    #[test]
    fn final_step_completes_the_procedure() {
        let config = ActionConfig {
            steps: vec!["lower_car".to_owned(), "tighten_bolts".to_owned()],
            validation_frames: 2,
            ..ActionConfig::default()
        };
        let mut v = ActionStepValidator::new(&config);
        let now = Instant::now();
        v.update("lower_car", 0.9, now);
        assert_eq!(
            v.update("lower_car", 0.9, now).status,
            StepStatus::StepCompleted { next_index: 1 }
        );
        v.update("tighten_bolts", 0.9, now);
        let done = v.update("tighten_bolts", 0.9, now);
        assert_eq!(done.status, StepStatus::ProcedureCompleted);
        assert!(!done.reset_classifier);
        assert!(v.is_complete());
        assert_eq!(v.current_step(), None);

        assert_eq!(
            v.update("anything", 1.0, now).status,
            StepStatus::ProcedureCompleted
        );
        assert!(!v.reset_progress());
    }
}
