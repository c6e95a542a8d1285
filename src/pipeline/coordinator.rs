//! Per-frame orchestration: models, the state machine, and the classifier bridge.
//!
//! [`ProcedureOrchestrator::tick`] runs once per acquired frame on the
//! caller's thread. Detection runs inline; action classification goes
//! through the [`ClassificationBridge`] so the tick never waits on it.

use crate::action::SmoothedClassifier;
use crate::config::AssistConfig;
use crate::error::Result;
use crate::models::ModelProvider;
use crate::pipeline::bridge::ClassificationBridge;
use crate::procedure::{Observation, ProcedureMachine};
use crate::runtime::{ProcedureEvent, ProcedureState};
use crate::vision::{ActionClassifier, ActionPrediction, Detection, Frame, ObjectDetector};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Frames per second averaged over the last few ticks.
const FPS_WINDOW: usize = 30;

/// Everything the caller needs to render one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub state: ProcedureState,
    pub status_lines: Vec<String>,
    pub events: Vec<ProcedureEvent>,
    pub completed: bool,
    /// Moving-average frame rate.
    pub fps: f64,
}

/// Moving average of instantaneous frame rates.
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    window: usize,
    samples: VecDeque<f64>,
    last_tick: Option<Instant>,
}

impl FrameRateMeter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            last_tick: None,
        }
    }

    /// Record a tick at `now` and return the current average.
    pub fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last_tick.replace(now) {
            let secs = now.saturating_duration_since(last).as_secs_f64();
            if secs > 0.0 {
                if self.samples.len() == self.window {
                    self.samples.pop_front();
                }
                self.samples.push_back(1.0 / secs);
            }
        }
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

pub struct ProcedureOrchestrator {
    config: AssistConfig,
    machine: ProcedureMachine,
    models: Box<dyn ModelProvider>,
    detector: Option<Box<dyn ObjectDetector>>,
    bridge: Option<ClassificationBridge>,
    fps: FrameRateMeter,
    frames_submitted: u64,
    frames_dropped: u64,
}

impl ProcedureOrchestrator {
    /// Validate the configuration and load the target detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the target
    /// detector cannot be loaded.
    pub fn new(config: AssistConfig, mut models: Box<dyn ModelProvider>) -> Result<Self> {
        config.validate()?;
        let detector = models.target_detector()?;
        info!("initial state: {}", ProcedureState::DetectingTarget);
        Ok(Self {
            machine: ProcedureMachine::new(&config),
            config,
            models,
            detector: Some(detector),
            bridge: None,
            fps: FrameRateMeter::new(FPS_WINDOW),
            frames_submitted: 0,
            frames_dropped: 0,
        })
    }

    /// Process one frame.
    ///
    /// # Errors
    ///
    /// Returns an error only if a stage's model cannot be loaded or its
    /// worker cannot be started on entering that stage. Per-frame detection
    /// and classification failures are logged and treated as "nothing seen".
    pub fn tick(&mut self, frame: Frame, now: Instant) -> Result<TickReport> {
        let fps = self.fps.tick(now);

        let outcome = match self.machine.state() {
            ProcedureState::DetectingTarget | ProcedureState::CollectingItems => {
                let detections = self.detect(&frame);
                self.machine
                    .advance(Observation::Detections(&detections), now)
            }
            ProcedureState::ExecutingSteps => {
                let prediction = self.classify(frame);
                self.machine
                    .advance(Observation::Prediction(prediction.as_ref()), now)
            }
        };

        for event in &outcome.events {
            self.apply(event)?;
        }

        Ok(TickReport {
            state: outcome.state,
            status_lines: outcome.status_lines,
            events: outcome.events,
            completed: outcome.completed,
            fps,
        })
    }

    /// Operator reset of the current step. Ignored outside step execution.
    pub fn reset_validation(&mut self) -> bool {
        let reset = self.machine.reset_validation();
        if reset && let Some(bridge) = &self.bridge {
            bridge.request_reset();
        }
        reset
    }

    /// Stop the classification worker. Returns `false` if it had to be detached.
    pub fn shutdown(&mut self) -> bool {
        info!(
            "average frame rate {:.1} fps, {} frames classified, {} dropped",
            self.fps.average(),
            self.frames_submitted,
            self.frames_dropped
        );
        match self.bridge.take() {
            Some(mut bridge) => bridge.shutdown(),
            None => true,
        }
    }

    pub fn state(&self) -> ProcedureState {
        self.machine.state()
    }

    pub fn machine(&self) -> &ProcedureMachine {
        &self.machine
    }

    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    pub fn average_fps(&self) -> f64 {
        self.fps.average()
    }

    /// Frames handed to the classifier and frames dropped because it was busy.
    pub fn classifier_counters(&self) -> (u64, u64) {
        (self.frames_submitted, self.frames_dropped)
    }

    fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        let Some(detector) = self.detector.as_mut() else {
            return Vec::new();
        };
        match detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("detection failed: {e}");
                Vec::new()
            }
        }
    }

    fn classify(&mut self, frame: Frame) -> Option<ActionPrediction> {
        let bridge = self.bridge.as_ref()?;
        if bridge.submit(frame) {
            self.frames_submitted += 1;
        } else {
            self.frames_dropped += 1;
        }
        bridge.try_take_result()
    }

    fn apply(&mut self, event: &ProcedureEvent) -> Result<()> {
        match event {
            ProcedureEvent::StateChanged {
                to: ProcedureState::CollectingItems,
                ..
            } => {
                self.detector = None;
                self.detector = Some(self.models.tool_detector()?);
                info!("switched to tool detector");
            }
            ProcedureEvent::StateChanged {
                to: ProcedureState::ExecutingSteps,
                ..
            } => {
                self.detector = None;
                self.start_bridge()?;
            }
            ProcedureEvent::ClassifierResetRequested { reason } => {
                debug!("classifier reset requested: {reason:?}");
                if let Some(bridge) = &self.bridge {
                    bridge.request_reset();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn start_bridge(&mut self) -> Result<()> {
        if self.bridge.is_some() {
            return Ok(());
        }
        info!("initializing action recognition");
        let classifier = self.models.action_classifier()?;
        let smoothed: Box<dyn ActionClassifier> = Box::new(SmoothedClassifier::new(
            classifier,
            self.config.action.smoothing_window,
        ));
        self.bridge = Some(ClassificationBridge::spawn(
            smoothed,
            self.config.action.worker_join_timeout(),
        )?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::time::Duration;

    #[test]
    fn fps_meter_averages_recent_ticks() {
        let mut m = FrameRateMeter::new(3);
        let base = Instant::now();
        assert!(m.tick(base).abs() < f64::EPSILON);
        m.tick(base + Duration::from_millis(100));
        let fps = m.tick(base + Duration::from_millis(150));
        // (10 + 20) / 2
        assert!((fps - 15.0).abs() < 1e-9);
    }

    #[test]
    fn fps_meter_keeps_only_the_window() {
        let mut m = FrameRateMeter::new(2);
        let base = Instant::now();
        let mut t = base;
        m.tick(t);
        for step in [1_000, 100, 100] {
            t += Duration::from_millis(step);
            m.tick(t);
        }
        assert!((m.average() - 10.0).abs() < 1e-9);
    }
}
