//! Tire Assist: real-time guidance through a tire change.
//!
//! The assistant watches a video stream and walks the operator through three
//! phases:
//! - **Target**: a flat tire must stay in view for the validation window
//! - **Items**: each required tool must be confirmed the same way
//! - **Steps**: an action classifier must recognise every procedure step
//!   for a run of consecutive frames
//!
//! Detection runs on the frame loop. Action classification runs on its own
//! worker behind a single-slot bridge so a slow model never stalls the loop.
//! A separate voice channel answers spoken questions from a canned FAQ.

pub mod action;
pub mod assistant;
pub mod audio;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod procedure;
pub mod replay;
pub mod runtime;
pub mod startup;
pub mod tracking;
pub mod vision;

pub use config::AssistConfig;
pub use error::{AssistError, Result};
pub use pipeline::{AssistantSession, ProcedureOrchestrator, TickReport};
pub use procedure::{Observation, ProcedureMachine, TickOutcome};
pub use runtime::{ProcedureEvent, ProcedureState};
pub use startup::{PreflightReport, preflight_check};
