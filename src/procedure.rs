//! The procedure state machine.
//!
//! [`ProcedureMachine`] is pure: it sees one [`Observation`] per tick plus
//! the tick's timestamp and never touches a model, a thread, or the clock.
//! Given the same observation sequence it always makes the same transitions.

use crate::action::{ActionStepValidator, StepStatus};
use crate::config::{ActionConfig, AssistConfig};
use crate::runtime::{ProcedureEvent, ProcedureState, ResetReason};
use crate::tracking::{ConfirmationStatus, StableObservationTracker, ToolSetConfirmer};
use crate::vision::{ActionPrediction, Detection};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::info;

/// What the sensors produced for one tick.
#[derive(Debug, Clone, Copy)]
pub enum Observation<'a> {
    /// Object detections for the current frame.
    Detections(&'a [Detection]),
    /// The latest action prediction, if one arrived this tick.
    Prediction(Option<&'a ActionPrediction>),
}

/// Result of one [`ProcedureMachine::advance`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// State after this tick.
    pub state: ProcedureState,
    /// Display lines, title first.
    pub status_lines: Vec<String>,
    pub events: Vec<ProcedureEvent>,
    /// The final step has been completed.
    pub completed: bool,
}

impl TickOutcome {
    fn new(state: ProcedureState) -> Self {
        Self {
            state,
            status_lines: Vec::new(),
            events: Vec::new(),
            completed: false,
        }
    }

    /// Whether any event this tick asks for a classifier state reset.
    pub fn reset_requested(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, ProcedureEvent::ClassifierResetRequested { .. }))
    }
}

pub struct ProcedureMachine {
    state: ProcedureState,
    target_label: String,
    target_name: String,
    detection_threshold: f32,
    target: StableObservationTracker,
    items: ToolSetConfirmer,
    action_config: ActionConfig,
    steps: Option<ActionStepValidator>,
    completed: bool,
    /// An operator reset happened since the last tick.
    operator_reset: bool,
}

impl ProcedureMachine {
    pub fn new(config: &AssistConfig) -> Self {
        Self {
            state: ProcedureState::DetectingTarget,
            target_label: config.detection.target_label.clone(),
            target_name: display_name(&config.detection.target_label),
            detection_threshold: config.detection.confidence_threshold,
            target: StableObservationTracker::from_config(&config.confirmation),
            items: ToolSetConfirmer::new(
                config.detection.required_tools.iter().cloned(),
                &config.confirmation,
            ),
            action_config: config.action.clone(),
            steps: None,
            completed: false,
            operator_reset: false,
        }
    }

    /// Feed one tick.
    ///
    /// Observations that do not belong to the current state count as
    /// "nothing seen".
    pub fn advance(&mut self, observation: Observation<'_>, now: Instant) -> TickOutcome {
        let mut out = TickOutcome::new(self.state);
        if self.completed {
            out.status_lines.push("ALL STEPS COMPLETED!".to_owned());
            out.completed = true;
            return out;
        }
        if std::mem::take(&mut self.operator_reset) {
            out.events.push(ProcedureEvent::ClassifierResetRequested {
                reason: ResetReason::Operator,
            });
        }

        match (self.state, observation) {
            (ProcedureState::DetectingTarget, Observation::Detections(d)) => {
                self.detect_target(d, now, &mut out);
            }
            (ProcedureState::DetectingTarget, Observation::Prediction(_)) => {
                self.detect_target(&[], now, &mut out);
            }
            (ProcedureState::CollectingItems, Observation::Detections(d)) => {
                self.collect_items(d, now, &mut out);
            }
            (ProcedureState::CollectingItems, Observation::Prediction(_)) => {
                self.collect_items(&[], now, &mut out);
            }
            (ProcedureState::ExecutingSteps, Observation::Prediction(p)) => {
                self.execute_steps(p, now, &mut out);
            }
            (ProcedureState::ExecutingSteps, Observation::Detections(_)) => {
                self.execute_steps(None, now, &mut out);
            }
        }

        out.state = self.state;
        out.completed = self.completed;
        out
    }

    /// Operator reset of the current step's progress.
    ///
    /// Only honoured while executing steps. Returns whether the classifier
    /// state should be reset as well. A successful reset is also reported as
    /// a [`ResetReason::Operator`] event on the next tick.
    pub fn reset_validation(&mut self) -> bool {
        if self.state != ProcedureState::ExecutingSteps || self.completed {
            info!("reset ignored in state {}", self.state);
            return false;
        }
        let Some(validator) = self.steps.as_mut() else {
            return false;
        };
        let reset = validator.reset_progress();
        if reset {
            info!("action validation reset");
            self.operator_reset = true;
        }
        reset
    }

    pub fn state(&self) -> ProcedureState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn target_tracker(&self) -> &StableObservationTracker {
        &self.target
    }

    pub fn items(&self) -> &ToolSetConfirmer {
        &self.items
    }

    /// Step validator; exists once the procedure reaches its steps.
    pub fn steps(&self) -> Option<&ActionStepValidator> {
        self.steps.as_ref()
    }

    fn transition(&mut self, to: ProcedureState, out: &mut TickOutcome) {
        let from = self.state;
        info!("transitioned {from} -> {to}");
        self.state = to;
        out.events.push(ProcedureEvent::StateChanged { from, to });
    }

    fn detect_target(&mut self, detections: &[Detection], now: Instant, out: &mut TickOutcome) {
        out.status_lines
            .push(format!("STEP 1: Find the {}", self.target_name));

        let present = detections.iter().any(|d| {
            d.confidence >= self.detection_threshold && d.label == self.target_label
        });
        match self.target.observe(present, now) {
            ConfirmationStatus::Validating { remaining } => out.status_lines.push(format!(
                "Confirming {}... {:.1}s",
                self.target_name,
                remaining.as_secs_f64()
            )),
            ConfirmationStatus::SearchingAfterLoss { remaining } => out
                .status_lines
                .push(format!("Searching... {:.1}s", remaining.as_secs_f64())),
            ConfirmationStatus::NotStarted => out.status_lines.push(format!(
                "Point camera at the {}",
                self.target_name.to_lowercase()
            )),
            ConfirmationStatus::Confirmed => {
                info!("{} confirmed", self.target_label);
                out.status_lines
                    .push(format!("{} Confirmed!", self.target_name));
                out.events.push(ProcedureEvent::TargetConfirmed {
                    label: self.target_label.clone(),
                });
                self.items.reset();
                self.transition(ProcedureState::CollectingItems, out);
            }
        }
    }

    fn collect_items(&mut self, detections: &[Detection], now: Instant, out: &mut TickOutcome) {
        out.status_lines
            .push("STEP 2: Collect Required Tools".to_owned());

        let observed: BTreeSet<String> = detections
            .iter()
            .filter(|d| d.confidence >= self.detection_threshold)
            .filter(|d| self.items.required().contains(&d.label))
            .map(|d| d.label.clone())
            .collect();

        let update = self.items.update(&observed, now);
        if !update.status_messages.is_empty() {
            out.status_lines.push(update.status_messages.join(" | "));
        }
        for label in update.confirmed_now {
            out.events.push(ProcedureEvent::ItemConfirmed { label });
        }

        let collected: Vec<&str> = self.items.confirmed().iter().map(String::as_str).collect();
        if !collected.is_empty() {
            out.status_lines
                .push(format!("Collected: {}", collected.join(", ")));
        }
        let needed: Vec<&str> = self.items.still_needed().map(String::as_str).collect();
        if !needed.is_empty() {
            out.status_lines
                .push(format!("Needed: {}", needed.join(", ")));
        }

        if self.items.is_complete() {
            let validator = ActionStepValidator::new(&self.action_config);
            if let Some(first) = validator.current_step() {
                info!("starting action validation for: {first}");
            }
            self.steps = Some(validator);
            self.transition(ProcedureState::ExecutingSteps, out);
        }
    }

    fn execute_steps(
        &mut self,
        prediction: Option<&ActionPrediction>,
        now: Instant,
        out: &mut TickOutcome,
    ) {
        let validator = self
            .steps
            .get_or_insert_with(|| ActionStepValidator::new(&self.action_config));

        let index = validator.progress().step_index;
        let step_label = validator.current_step().map(str::to_owned);
        if let Some(step) = &step_label {
            out.status_lines
                .push(format!("STEP {}: {step}", index + 3));
        }

        if let Some(p) = prediction {
            let label = p.smoothed_label.as_str();
            out.status_lines
                .push(format!("Action: {label} ({:.2})", p.confidence));

            let update = validator.update(label, p.confidence, now);
            match update.status {
                StepStatus::InProgress { .. } => {
                    if update.reset_classifier {
                        out.events.push(ProcedureEvent::ClassifierResetRequested {
                            reason: ResetReason::ConfidenceDrop,
                        });
                    }
                }
                StepStatus::StepCompleted { .. } => {
                    out.status_lines.push("Step Completed!".to_owned());
                    out.events.push(ProcedureEvent::StepCompleted {
                        index,
                        label: step_label.clone().unwrap_or_default(),
                    });
                    out.events.push(ProcedureEvent::ClassifierResetRequested {
                        reason: ResetReason::StepAdvanced,
                    });
                }
                StepStatus::ProcedureCompleted => {
                    out.status_lines.push("ALL STEPS COMPLETED!".to_owned());
                    out.events.push(ProcedureEvent::StepCompleted {
                        index,
                        label: step_label.clone().unwrap_or_default(),
                    });
                    out.events.push(ProcedureEvent::ProcedureCompleted);
                    self.completed = true;
                    return;
                }
            }
        }

        out.status_lines.push(format!(
            "Validation: {}/{}",
            validator.progress().validation_count,
            validator.validation_frames()
        ));
    }
}

/// `Flat_tire` -> `Flat Tire`.
fn display_name(label: &str) -> String {
    label
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
