//! The run loop: frames in, ticks out, orderly teardown at the end.

use crate::assistant::{AudioIntentPipeline, ResponseDispatcher};
use crate::error::Result;
use crate::pipeline::coordinator::{ProcedureOrchestrator, TickReport};
use crate::runtime::ProcedureState;
use crate::vision::Frame;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long a paused loop waits for a command before checking cancellation.
const PAUSE_POLL: Duration = Duration::from_millis(20);

/// Source of video frames (camera, file, network stream).
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device.
    fn release(&mut self) {}
}

/// Commands an operator can issue while the loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Clear progress on the current step.
    ResetValidation,
    /// Stop taking frames until [`Resume`](Self::Resume). Progress is kept.
    Pause,
    Resume,
    /// End the session.
    Quit,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    StreamEnded,
    Quit,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub end: SessionEnd,
    pub final_state: ProcedureState,
    pub ticks: u64,
    pub average_fps: f64,
    /// Every worker stopped within its timeout.
    pub clean_shutdown: bool,
}

/// Owns every running component for one guided session.
pub struct AssistantSession {
    orchestrator: ProcedureOrchestrator,
    frames: Box<dyn FrameSource>,
    commands: Option<Receiver<OperatorCommand>>,
    listener: Option<AudioIntentPipeline>,
    dispatcher: Option<ResponseDispatcher>,
    cancel: CancellationToken,
    paused: bool,
}

impl AssistantSession {
    pub fn new(orchestrator: ProcedureOrchestrator, frames: Box<dyn FrameSource>) -> Self {
        Self {
            orchestrator,
            frames,
            commands: None,
            listener: None,
            dispatcher: None,
            cancel: CancellationToken::new(),
            paused: false,
        }
    }

    /// Accept operator commands from `rx`.
    pub fn with_commands(mut self, rx: Receiver<OperatorCommand>) -> Self {
        self.commands = Some(rx);
        self
    }

    /// Attach the voice channel. Both are stopped during teardown.
    pub fn with_voice(mut self, listener: AudioIntentPipeline, dispatcher: ResponseDispatcher) -> Self {
        self.listener = Some(listener);
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Token that ends the loop at the next tick when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until completion, end of stream, quit, or cancellation, then tear down.
    ///
    /// `on_tick` receives every tick report for display.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage fails to start. Teardown still runs.
    pub fn run<F>(mut self, mut on_tick: F) -> Result<SessionSummary>
    where
        F: FnMut(&TickReport),
    {
        let mut ticks = 0_u64;
        let result = self.run_loop(&mut on_tick, &mut ticks);
        let clean_shutdown = self.teardown();

        let end = result?;
        info!("session ended ({end:?}) after {ticks} ticks");
        Ok(SessionSummary {
            end,
            final_state: self.orchestrator.state(),
            ticks,
            average_fps: self.orchestrator.average_fps(),
            clean_shutdown,
        })
    }

    fn run_loop<F>(&mut self, on_tick: &mut F, ticks: &mut u64) -> Result<SessionEnd>
    where
        F: FnMut(&TickReport),
    {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionEnd::Cancelled);
            }
            if self.drain_commands() || (self.paused && self.wait_while_paused()) {
                info!("quitting");
                return Ok(SessionEnd::Quit);
            }
            if self.paused {
                continue;
            }

            let frame = match self.frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("end of video stream");
                    return Ok(SessionEnd::StreamEnded);
                }
                Err(e) => {
                    warn!("frame read failed: {e}");
                    return Ok(SessionEnd::StreamEnded);
                }
            };

            let report = self.orchestrator.tick(frame, Instant::now())?;
            *ticks += 1;
            on_tick(&report);
            if report.completed {
                return Ok(SessionEnd::Completed);
            }
        }
    }

    /// Apply pending commands. Returns `true` on quit.
    fn drain_commands(&mut self) -> bool {
        loop {
            let Some(rx) = &self.commands else {
                return false;
            };
            match rx.try_recv() {
                Ok(command) => {
                    if self.apply_command(command) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    self.commands_closed();
                    return false;
                }
            }
        }
    }

    /// Wait up to [`PAUSE_POLL`] for a command. Returns `true` on quit.
    fn wait_while_paused(&mut self) -> bool {
        let Some(rx) = &self.commands else {
            self.paused = false;
            return false;
        };
        match rx.recv_timeout(PAUSE_POLL) {
            Ok(command) => self.apply_command(command),
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.commands_closed();
                false
            }
        }
    }

    fn apply_command(&mut self, command: OperatorCommand) -> bool {
        match command {
            OperatorCommand::ResetValidation => {
                self.orchestrator.reset_validation();
            }
            OperatorCommand::Pause if !self.paused => {
                info!("paused");
                self.paused = true;
            }
            OperatorCommand::Resume if self.paused => {
                info!("resumed");
                self.paused = false;
            }
            OperatorCommand::Pause | OperatorCommand::Resume => {}
            OperatorCommand::Quit => return true,
        }
        false
    }

    /// Nobody can resume a paused loop once the sender is gone.
    fn commands_closed(&mut self) {
        self.commands = None;
        if self.paused {
            warn!("command channel closed while paused, resuming");
            self.paused = false;
        }
    }

    /// Stop audio, then speech output, then the classifier, then release the
    /// frame source. Returns whether every worker stopped in time.
    fn teardown(&mut self) -> bool {
        info!("releasing resources");
        let mut clean = true;
        if let Some(mut listener) = self.listener.take() {
            clean &= listener.stop();
        }
        if let Some(mut dispatcher) = self.dispatcher.take() {
            clean &= dispatcher.stop();
        }
        clean &= self.orchestrator.shutdown();
        self.frames.release();
        clean
    }
}
