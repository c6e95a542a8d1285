//! Sustained-observation confirmation for the target and the tool set.

pub mod stable;
pub mod tools;

pub use stable::{ConfirmationState, ConfirmationStatus, StableObservationTracker};
pub use tools::{ToolSetConfirmer, ToolUpdate};
