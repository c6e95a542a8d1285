//! Serial speech output for queued responses.

use crate::assistant::SpeechSynthesizer;
use crate::error::{AssistError, Result};
use crate::pipeline::join_with_timeout;
use crate::pipeline::messages::ResponseMessage;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::io::Write as _;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STOP_MARGIN: Duration = Duration::from_millis(500);

/// Single consumer of the response queue.
///
/// Any number of producers may hold a [`sender`](ResponseDispatcher::sender);
/// messages are spoken in arrival order, one at a time.
pub struct ResponseDispatcher {
    tx: Sender<ResponseMessage>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl ResponseDispatcher {
    /// Start the dispatcher thread.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Pipeline`] if the thread cannot be spawned.
    pub fn spawn(synthesizer: Arc<dyn SpeechSynthesizer>, poll_timeout: Duration) -> Result<Self> {
        let (tx, rx) = unbounded::<ResponseMessage>();
        let cancel = CancellationToken::new();

        let worker = {
            let synthesizer = Arc::clone(&synthesizer);
            let cancel = cancel.clone();
            std::thread::Builder::new()
                .name("response-dispatcher".into())
                .spawn(move || dispatch(&rx, poll_timeout, synthesizer.as_ref(), &cancel))
                .map_err(|e| AssistError::Pipeline(format!("failed to spawn dispatcher: {e}")))?
        };
        info!("response dispatcher started");

        Ok(Self {
            tx,
            synthesizer,
            cancel,
            worker: Some(worker),
            join_timeout: poll_timeout + STOP_MARGIN,
        })
    }

    /// A producer handle for the response queue.
    pub fn sender(&self) -> Sender<ResponseMessage> {
        self.tx.clone()
    }

    /// Queue one message from the owner's side.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Channel`] if the dispatcher thread has exited.
    pub fn say(&self, message: ResponseMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| AssistError::Channel("response dispatcher is not running".into()))
    }

    /// Close the queue and wait up to `timeout` for everything already
    /// queued to be spoken.
    ///
    /// Other producers still holding a sender keep the queue open. On
    /// timeout the dispatcher is stopped as in [`stop`](Self::stop).
    pub fn finish(mut self, timeout: Duration) -> bool {
        let (closed, _) = unbounded();
        drop(std::mem::replace(&mut self.tx, closed));
        let Some(worker) = self.worker.take() else {
            return true;
        };
        let finished = join_with_timeout(worker, timeout, "response dispatcher");
        if !finished {
            self.cancel.cancel();
            self.synthesizer.halt();
        }
        finished
    }

    /// Stop the loop, interrupting any utterance in progress.
    ///
    /// Queued messages not yet spoken are discarded. Returns `false` if the
    /// thread had to be detached. Calling it again is a no-op.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        self.cancel.cancel();
        self.synthesizer.halt();
        join_with_timeout(worker, self.join_timeout, "response dispatcher")
    }
}

impl Drop for ResponseDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(
    rx: &Receiver<ResponseMessage>,
    poll_timeout: Duration,
    synthesizer: &dyn SpeechSynthesizer,
    cancel: &CancellationToken,
) {
    while !cancel.is_cancelled() {
        match rx.recv_timeout(poll_timeout) {
            Ok(message) => {
                debug!("speaking {:?} response", message.source);
                if let Err(e) = synthesizer.speak(&message.text) {
                    warn!("speech output failed: {e}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("response dispatcher stopped");
}

/// Prints responses to stdout instead of speaking them.
#[derive(Debug, Default)]
pub struct ConsoleSynthesizer;

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&self, text: &str) -> Result<()> {
        writeln!(std::io::stdout().lock(), "Assistant: {text}")
            .map_err(|e| AssistError::Speech(format!("console output failed: {e}")))
    }

    fn halt(&self) {}
}
