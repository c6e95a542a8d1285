//! Single-slot hand-off between the frame loop and the action classifier.
//!
//! The frame loop must never wait on the classifier. Requests go through a
//! capacity-1 channel that rejects new frames while one is pending, and
//! results come back through another capacity-1 channel polled without
//! blocking. Dropped frames are the normal outcome under load.

use crate::error::{AssistError, Result};
use crate::pipeline::join_with_timeout;
use crate::pipeline::messages::BridgeRequest;
use crate::vision::{ActionClassifier, ActionPrediction, Frame};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SENTINEL_RETRY: Duration = Duration::from_millis(20);

/// Owns the classification worker thread and both ends of its slots.
pub struct ClassificationBridge {
    requests: Sender<BridgeRequest>,
    results: Receiver<ActionPrediction>,
    reset: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl ClassificationBridge {
    /// Start the worker thread around `classifier`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Pipeline`] if the thread cannot be spawned.
    pub fn spawn(classifier: Box<dyn ActionClassifier>, join_timeout: Duration) -> Result<Self> {
        let (req_tx, req_rx) = bounded::<BridgeRequest>(1);
        let (res_tx, res_rx) = bounded::<ActionPrediction>(1);
        let reset = Arc::new(AtomicBool::new(false));

        let worker_reset = Arc::clone(&reset);
        let worker = std::thread::Builder::new()
            .name("action-classifier".into())
            .spawn(move || run_worker(classifier, &req_rx, &res_tx, &worker_reset))
            .map_err(|e| {
                AssistError::Pipeline(format!("failed to spawn classification worker: {e}"))
            })?;

        Ok(Self {
            requests: req_tx,
            results: res_rx,
            reset,
            worker: Some(worker),
            join_timeout,
        })
    }

    /// Offer a frame without blocking.
    ///
    /// Returns `false` if a frame is already waiting (the new one is dropped)
    /// or the worker has stopped.
    pub fn submit(&self, frame: Frame) -> bool {
        match self.requests.try_send(BridgeRequest::Classify(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                debug!("classification worker gone, frame dropped");
                false
            }
        }
    }

    /// Take the pending prediction, if any, without blocking.
    pub fn try_take_result(&self) -> Option<ActionPrediction> {
        self.results.try_recv().ok()
    }

    /// Ask the worker to reset the classifier before its next prediction.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the worker and wait up to the join timeout for it.
    ///
    /// Returns `true` if the worker exited in time. A late worker is detached.
    pub fn shutdown(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        let deadline = Instant::now().checked_add(self.join_timeout);

        loop {
            // The worker may be blocked publishing a result nobody took.
            while self.results.try_recv().is_ok() {}
            match self
                .requests
                .send_timeout(BridgeRequest::Shutdown, SENTINEL_RETRY)
            {
                Ok(()) | Err(SendTimeoutError::Disconnected(_)) => break,
                Err(SendTimeoutError::Timeout(_)) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        warn!("classification worker busy, shutdown request not delivered");
                        break;
                    }
                }
            }
        }
        while self.results.try_recv().is_ok() {}

        let remaining = deadline.map_or(self.join_timeout, |d| {
            d.saturating_duration_since(Instant::now())
        });
        let joined = join_with_timeout(worker, remaining, "classification worker");
        if joined {
            info!("classification worker joined");
        }
        joined
    }
}

impl Drop for ClassificationBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut classifier: Box<dyn ActionClassifier>,
    requests: &Receiver<BridgeRequest>,
    results: &Sender<ActionPrediction>,
    reset: &AtomicBool,
) {
    info!("classification worker started");
    while let Ok(request) = requests.recv() {
        let frame = match request {
            BridgeRequest::Classify(frame) => frame,
            BridgeRequest::Shutdown => break,
        };

        if reset.swap(false, Ordering::AcqRel) {
            classifier.reset_state();
            debug!("classifier state reset");
        }

        let prediction = classifier
            .format(&frame)
            .and_then(|input| classifier.predict(&input));
        match prediction {
            Ok(p) => {
                if results.send(p).is_err() {
                    break;
                }
            }
            Err(e) => warn!("classification failed: {e}"),
        }
    }
    info!("classification worker stopped");
}
