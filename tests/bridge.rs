#![allow(clippy::unwrap_used, clippy::expect_used)]

//! The classification bridge never blocks the caller and keeps at most one
//! frame waiting.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tire_assist::AssistError;
use tire_assist::pipeline::ClassificationBridge;
use tire_assist::vision::{ActionClassifier, ActionPrediction, Frame, NormalizedFrame};

fn prediction(label: &str) -> ActionPrediction {
    ActionPrediction {
        label: label.to_owned(),
        confidence: 0.9,
        smoothed_label: label.to_owned(),
        probabilities: Vec::new(),
    }
}

fn wait_for_result(bridge: &ClassificationBridge, within: Duration) -> Option<ActionPrediction> {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if let Some(p) = bridge.try_take_result() {
            return Some(p);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

/// Announces each prediction, then waits for permission to finish it.
struct GatedClassifier {
    entered: Sender<()>,
    gate: Receiver<()>,
    served: usize,
}

impl ActionClassifier for GatedClassifier {
    fn resolution(&self) -> u32 {
        2
    }

    fn predict(&mut self, _input: &NormalizedFrame) -> tire_assist::Result<ActionPrediction> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        self.served += 1;
        Ok(prediction(&format!("frame-{}", self.served)))
    }

    fn reset_state(&mut self) {}
}

#[test]
fn busy_worker_holds_one_pending_frame_and_drops_the_rest() {
    let (entered_tx, entered_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let classifier = GatedClassifier {
        entered: entered_tx,
        gate: gate_rx,
        served: 0,
    };
    let mut bridge =
        ClassificationBridge::spawn(Box::new(classifier), Duration::from_secs(2)).unwrap();

    assert!(bridge.submit(Frame::blank(4, 4)));
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    // Worker is busy: one frame may wait, the next is rejected immediately.
    assert!(bridge.submit(Frame::blank(4, 4)));
    let started = Instant::now();
    assert!(!bridge.submit(Frame::blank(4, 4)));
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(bridge.try_take_result().is_none());

    gate_tx.send(()).unwrap();
    let first = wait_for_result(&bridge, Duration::from_secs(2)).unwrap();
    assert_eq!(first.label, "frame-1");

    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    gate_tx.send(()).unwrap();
    let second = wait_for_result(&bridge, Duration::from_secs(2)).unwrap();
    assert_eq!(second.label, "frame-2");

    // The rejected frame never reached the classifier.
    assert!(entered_rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(gate_tx);
    assert!(bridge.shutdown());
}

/// Records the order of resets and predictions.
struct RecordingClassifier {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ActionClassifier for RecordingClassifier {
    fn resolution(&self) -> u32 {
        2
    }

    fn predict(&mut self, _input: &NormalizedFrame) -> tire_assist::Result<ActionPrediction> {
        self.log.lock().unwrap().push("predict");
        Ok(prediction("loosen_bolts"))
    }

    fn reset_state(&mut self) {
        self.log.lock().unwrap().push("reset");
    }
}

#[test]
fn requested_reset_runs_before_the_next_prediction() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let classifier = RecordingClassifier {
        log: Arc::clone(&log),
    };
    let mut bridge =
        ClassificationBridge::spawn(Box::new(classifier), Duration::from_secs(2)).unwrap();

    assert!(bridge.submit(Frame::blank(4, 4)));
    wait_for_result(&bridge, Duration::from_secs(2)).unwrap();

    bridge.request_reset();
    assert!(bridge.submit(Frame::blank(4, 4)));
    wait_for_result(&bridge, Duration::from_secs(2)).unwrap();

    assert!(bridge.submit(Frame::blank(4, 4)));
    wait_for_result(&bridge, Duration::from_secs(2)).unwrap();

    assert!(bridge.shutdown());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["predict", "reset", "predict", "predict"]
    );
}

/// Fails every other prediction.
struct FlakyClassifier {
    calls: usize,
}

impl ActionClassifier for FlakyClassifier {
    fn resolution(&self) -> u32 {
        2
    }

    fn predict(&mut self, _input: &NormalizedFrame) -> tire_assist::Result<ActionPrediction> {
        self.calls += 1;
        if self.calls % 2 == 1 {
            return Err(AssistError::Classification("inference failed".into()));
        }
        Ok(prediction("raise_car"))
    }

    fn reset_state(&mut self) {}
}

#[test]
fn failed_prediction_yields_no_result_and_worker_keeps_going() {
    let mut bridge = ClassificationBridge::spawn(
        Box::new(FlakyClassifier { calls: 0 }),
        Duration::from_secs(2),
    )
    .unwrap();

    assert!(bridge.submit(Frame::blank(4, 4)));
    assert!(wait_for_result(&bridge, Duration::from_millis(200)).is_none());
    assert!(bridge.is_running());

    assert!(bridge.submit(Frame::blank(4, 4)));
    let p = wait_for_result(&bridge, Duration::from_secs(2)).unwrap();
    assert_eq!(p.label, "raise_car");
    assert!(bridge.shutdown());
}

#[test]
fn bad_frame_is_reported_as_no_result() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let classifier = RecordingClassifier {
        log: Arc::clone(&log),
    };
    let mut bridge =
        ClassificationBridge::spawn(Box::new(classifier), Duration::from_secs(2)).unwrap();

    assert!(bridge.submit(Frame::blank(0, 0)));
    assert!(wait_for_result(&bridge, Duration::from_millis(200)).is_none());
    assert!(bridge.shutdown());
    assert!(log.lock().unwrap().is_empty());
}

/// Never returns until `release` is dropped.
struct StuckClassifier {
    release: Receiver<()>,
}

impl ActionClassifier for StuckClassifier {
    fn resolution(&self) -> u32 {
        2
    }

    fn predict(&mut self, _input: &NormalizedFrame) -> tire_assist::Result<ActionPrediction> {
        let _ = self.release.recv();
        Ok(prediction("stuck"))
    }

    fn reset_state(&mut self) {}
}

#[test]
fn shutdown_gives_up_on_a_stuck_worker() {
    let (release_tx, release_rx) = unbounded::<()>();
    let mut bridge = ClassificationBridge::spawn(
        Box::new(StuckClassifier {
            release: release_rx,
        }),
        Duration::from_millis(150),
    )
    .unwrap();

    assert!(bridge.submit(Frame::blank(4, 4)));
    std::thread::sleep(Duration::from_millis(50));
    // Fill the request slot so the shutdown request cannot be delivered.
    assert!(bridge.submit(Frame::blank(4, 4)));

    let started = Instant::now();
    assert!(!bridge.shutdown());
    assert!(started.elapsed() < Duration::from_secs(1));
    drop(release_tx);
}
