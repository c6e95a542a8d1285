//! Scripted observation sequences for driving the state machine offline.
//!
//! A scenario is a list of segments, each repeating one observation for a
//! number of ticks at a fixed tick interval. Replays are deterministic.

use crate::config::AssistConfig;
use crate::error::{AssistError, Result};
use crate::procedure::{Observation, ProcedureMachine, TickOutcome};
use crate::runtime::{ProcedureEvent, ProcedureState};
use crate::vision::{ActionPrediction, Detection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedDetection {
    pub label: String,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPrediction {
    pub label: String,
    pub confidence: f32,
    /// Defaults to `label`.
    #[serde(default)]
    pub smoothed_label: Option<String>,
}

fn full_confidence() -> f32 {
    1.0
}

/// `repeat` ticks of the same observation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Segment {
    pub repeat: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<ScriptedDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<ScriptedPrediction>,
    /// Issue an operator reset before the first tick of this segment.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset_before: bool,
}

/// Longest accepted tick interval in a scenario file.
pub const MAX_TICK_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub tick_ms: u64,
    pub segments: Vec<Segment>,
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub ticks: u64,
    pub final_state: ProcedureState,
    pub completed: bool,
    /// Events with the 1-based tick they occurred on.
    pub events: Vec<(u64, ProcedureEvent)>,
}

impl ReplayReport {
    /// Number of state transitions seen.
    pub fn transitions(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| matches!(e, ProcedureEvent::StateChanged { .. }))
            .count()
    }
}

impl Scenario {
    /// Load a scenario from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the tick
    /// interval is zero or longer than [`MAX_TICK_MS`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario: Self = serde_json::from_str(&content).map_err(|e| {
            AssistError::Config(format!("invalid scenario {}: {e}", path.display()))
        })?;
        if scenario.tick_ms == 0 || scenario.tick_ms > MAX_TICK_MS {
            return Err(AssistError::Config(format!(
                "scenario tick_ms must be within 1..={MAX_TICK_MS}, got {}",
                scenario.tick_ms
            )));
        }
        Ok(scenario)
    }

    /// The shortest run that completes the procedure under `config`.
    ///
    /// Target and items are each held in view for exactly the validation
    /// window; every step is predicted for exactly the required frame count.
    pub fn happy_path(config: &AssistConfig, tick_ms: u64) -> Self {
        let tick_ms = tick_ms.max(1);
        let window_ms = u64::try_from(config.confirmation.validation_duration().as_millis())
            .unwrap_or(u64::MAX);
        let confirm_ticks = u32::try_from(window_ms.div_ceil(tick_ms) + 1).unwrap_or(u32::MAX);

        let mut segments = vec![Segment {
            repeat: confirm_ticks,
            detections: vec![ScriptedDetection {
                label: config.detection.target_label.clone(),
                confidence: 1.0,
            }],
            ..Segment::default()
        }];

        let tools: Vec<ScriptedDetection> = config
            .detection
            .required_tools
            .iter()
            .map(|label| ScriptedDetection {
                label: label.clone(),
                confidence: 1.0,
            })
            .collect();
        segments.push(Segment {
            repeat: if tools.is_empty() { 1 } else { confirm_ticks },
            detections: tools,
            ..Segment::default()
        });

        for step in &config.action.steps {
            segments.push(Segment {
                repeat: config.action.validation_frames,
                prediction: Some(ScriptedPrediction {
                    label: step.clone(),
                    confidence: 1.0,
                    smoothed_label: None,
                }),
                ..Segment::default()
            });
        }

        Self { tick_ms, segments }
    }

    /// Total ticks described.
    pub fn len(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.repeat)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replay `scenario` against a fresh state machine.
///
/// Stops early once the procedure completes. `on_tick` sees every outcome.
///
/// # Errors
///
/// Returns [`AssistError::Config`] if a tick's timestamp overflows the clock.
pub fn run_scenario<F>(
    config: &AssistConfig,
    scenario: &Scenario,
    mut on_tick: F,
) -> Result<ReplayReport>
where
    F: FnMut(u64, &TickOutcome),
{
    let mut machine = ProcedureMachine::new(config);
    let base = Instant::now();
    let tick = Duration::from_millis(scenario.tick_ms);
    let mut report = ReplayReport {
        ticks: 0,
        final_state: machine.state(),
        completed: false,
        events: Vec::new(),
    };

    'segments: for segment in &scenario.segments {
        if segment.reset_before {
            machine.reset_validation();
        }
        let detections: Vec<Detection> = segment
            .detections
            .iter()
            .map(|d| Detection::labelled(d.label.clone(), d.confidence))
            .collect();
        let prediction = segment.prediction.as_ref().map(|p| ActionPrediction {
            label: p.label.clone(),
            confidence: p.confidence,
            smoothed_label: p.smoothed_label.clone().unwrap_or_else(|| p.label.clone()),
            probabilities: Vec::new(),
        });

        for _ in 0..segment.repeat {
            let now = tick_time(base, tick, report.ticks).ok_or_else(|| {
                AssistError::Config(format!(
                    "scenario clock overflows at tick {} ({} ms per tick)",
                    report.ticks + 1,
                    scenario.tick_ms
                ))
            })?;
            let observation = match &prediction {
                Some(p) => Observation::Prediction(Some(p)),
                None => Observation::Detections(&detections),
            };
            let outcome = machine.advance(observation, now);
            report.ticks += 1;
            let n = report.ticks;
            on_tick(n, &outcome);

            report
                .events
                .extend(outcome.events.iter().cloned().map(|e| (n, e)));
            if outcome.completed {
                report.completed = true;
                break 'segments;
            }
        }
    }

    report.final_state = machine.state();
    info!(
        "replay finished after {} ticks in state {} (completed: {})",
        report.ticks, report.final_state, report.completed
    );
    Ok(report)
}

fn tick_time(base: Instant, tick: Duration, index: u64) -> Option<Instant> {
    let offset = tick.checked_mul(u32::try_from(index).ok()?)?;
    base.checked_add(offset)
}
