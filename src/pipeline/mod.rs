//! Frame loop, classification worker, and the thread plumbing between them.

pub mod bridge;
pub mod coordinator;
pub mod messages;
pub mod session;

pub use bridge::ClassificationBridge;
pub use coordinator::{FrameRateMeter, ProcedureOrchestrator, TickReport};
pub use session::{AssistantSession, FrameSource, OperatorCommand, SessionEnd, SessionSummary};

use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::warn;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Join `handle` unless it is still running after `timeout`.
///
/// Returns `true` if the thread finished. On timeout the thread is detached
/// and a warning is logged.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool {
    // No deadline when `timeout` overflows the clock.
    let deadline = Instant::now().checked_add(timeout);
    while !handle.is_finished() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("{name} did not stop within {timeout:?}, detaching");
            return false;
        }
        std::thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        warn!("{name} panicked");
    }
    true
}
