//! Listener thread: audio in, queued answers out.

use crate::assistant::{IntentResponder, SpeechRecognizer};
use crate::audio::CpalCapture;
use crate::config::AssistConfig;
use crate::error::{AssistError, Result};
use crate::pipeline::join_with_timeout;
use crate::pipeline::messages::{AudioChunk, ResponseMessage, Utterance};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Extra time allowed for the listener to notice a stop request.
const STOP_MARGIN: Duration = Duration::from_millis(500);

/// Runs capture, recognition, and intent lookup on its own thread.
pub struct AudioIntentPipeline {
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl AudioIntentPipeline {
    /// Start the listener.
    ///
    /// `start_capture` runs on the listener thread and must begin pushing
    /// audio blocks into the sender it is given. Its return value is held
    /// for the lifetime of the loop and dropped when the loop exits, which
    /// is how capture stops. The greeting is queued before capture starts.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Pipeline`] if the thread cannot be spawned.
    pub fn spawn<C, G>(
        greeting: String,
        poll_timeout: Duration,
        start_capture: C,
        mut recognizer: Box<dyn SpeechRecognizer>,
        mut responder: IntentResponder,
        responses: Sender<ResponseMessage>,
    ) -> Result<Self>
    where
        C: FnOnce(Sender<AudioChunk>) -> Result<G> + Send + 'static,
        G: 'static,
    {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let worker = std::thread::Builder::new()
            .name("intent-listener".into())
            .spawn(move || {
                if responses.send(ResponseMessage::greeting(greeting)).is_err() {
                    warn!("response queue closed before greeting");
                }

                let (audio_tx, audio_rx) = unbounded::<AudioChunk>();
                let _capture = match start_capture(audio_tx) {
                    Ok(guard) => guard,
                    Err(e) => {
                        error!("failed to start audio capture: {e}");
                        return;
                    }
                };
                info!("assistant is now listening");

                listen(
                    &audio_rx,
                    poll_timeout,
                    recognizer.as_mut(),
                    &mut responder,
                    &responses,
                    &loop_cancel,
                );
                info!("assistant stopped listening");
            })
            .map_err(|e| AssistError::Pipeline(format!("failed to spawn listener: {e}")))?;

        Ok(Self {
            cancel,
            worker: Some(worker),
            join_timeout: poll_timeout + STOP_MARGIN,
        })
    }

    /// Start the listener on the configured microphone.
    ///
    /// The device is opened on the listener thread, so a missing microphone
    /// is logged there and ends the listener without affecting the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Pipeline`] if the thread cannot be spawned.
    pub fn with_microphone(
        config: &AssistConfig,
        recognizer: Box<dyn SpeechRecognizer>,
        responder: IntentResponder,
        responses: Sender<ResponseMessage>,
    ) -> Result<Self> {
        let audio = config.audio.clone();
        Self::spawn(
            config.assistant.greeting.clone(),
            config.audio.poll_timeout(),
            move |tx| CpalCapture::new(&audio)?.start(tx),
            recognizer,
            responder,
            responses,
        )
    }

    /// Ask the loop to exit and wait for it. Returns `false` if it was detached.
    pub fn stop(&mut self) -> bool {
        self.cancel.cancel();
        match self.worker.take() {
            Some(worker) => join_with_timeout(worker, self.join_timeout, "intent listener"),
            None => true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for AudioIntentPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen(
    audio: &Receiver<AudioChunk>,
    poll_timeout: Duration,
    recognizer: &mut dyn SpeechRecognizer,
    responder: &mut IntentResponder,
    responses: &Sender<ResponseMessage>,
    cancel: &CancellationToken,
) {
    while !cancel.is_cancelled() {
        let chunk = match audio.recv_timeout(poll_timeout) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("audio capture ended");
                break;
            }
        };

        let text = match recognize(recognizer, &chunk) {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(e) => {
                warn!("speech recognition failed: {e}");
                continue;
            }
        };
        info!("recognized: '{text}'");

        let utterance = Utterance {
            text,
            recognized_at: Instant::now(),
        };
        match responder.respond(utterance) {
            Ok(reply) => {
                info!("response: {}", reply.answer);
                if responses.send(ResponseMessage::answer(reply.answer)).is_err() {
                    warn!("response queue closed");
                    break;
                }
            }
            Err(e) => warn!("intent classification failed: {e}"),
        }
    }
}

/// Feed a block; return the utterance text if one completed and is non-blank.
fn recognize(recognizer: &mut dyn SpeechRecognizer, chunk: &AudioChunk) -> Result<Option<String>> {
    if !recognizer.accept(chunk)? {
        return Ok(None);
    }
    let text = recognizer.take_text()?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(text.to_owned()))
}
