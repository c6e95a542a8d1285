//! Step-by-step validation of the procedure from streaming action predictions.

pub mod smoothing;
pub mod validator;

pub use smoothing::{LabelSmoother, SmoothedClassifier};
pub use validator::{ActionProgress, ActionStepValidator, StepStatus, StepUpdate};
