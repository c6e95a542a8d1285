//! Events emitted by the procedure for display and observability.
//!
//! Lightweight and cloneable so a tick can hand them to the caller without
//! holding on to any procedure state.

use std::fmt;

/// Stage of the guided procedure. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcedureState {
    DetectingTarget,
    CollectingItems,
    ExecutingSteps,
}

impl fmt::Display for ProcedureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DetectingTarget => "DETECTING_TARGET",
            Self::CollectingItems => "COLLECTING_ITEMS",
            Self::ExecutingSteps => "EXECUTING_STEPS",
        };
        f.write_str(name)
    }
}

/// Why the action classifier's streaming state is being discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Confidence on the expected step fell sharply between two predictions.
    ConfidenceDrop,
    /// A new step started.
    StepAdvanced,
    /// The operator asked for it.
    Operator,
}

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcedureEvent {
    /// The procedure moved to a new stage.
    StateChanged {
        from: ProcedureState,
        to: ProcedureState,
    },
    /// The procedure target passed its sustained-observation check.
    TargetConfirmed { label: String },
    /// A required item passed its sustained-observation check.
    ItemConfirmed { label: String },
    /// Step `index` (zero-based) finished.
    StepCompleted { index: usize, label: String },
    /// The final step finished. Terminal.
    ProcedureCompleted,
    /// The action classifier should reset its streaming state.
    ClassifierResetRequested { reason: ResetReason },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn states_are_ordered_along_the_procedure() {
        assert!(ProcedureState::DetectingTarget < ProcedureState::CollectingItems);
        assert!(ProcedureState::CollectingItems < ProcedureState::ExecutingSteps);
        assert_eq!(ProcedureState::ExecutingSteps.to_string(), "EXECUTING_STEPS");
    }
}
