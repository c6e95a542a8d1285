//! Startup checks run before the frame loop.
//!
//! Everything that can fail at setup fails here, before any worker starts:
//! configuration values, model files, the action model description, and
//! the FAQ book.

use crate::assistant::FaqBook;
use crate::config::AssistConfig;
use crate::error::Result;
use crate::models::{ActionModelSpec, verify_model_paths};
use tracing::{info, warn};

/// What the checks found.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub action_model: ActionModelSpec,
    /// Configured steps missing from the action model's classes.
    pub unknown_steps: Vec<String>,
    /// Loaded FAQ, when the voice channel is enabled.
    pub faq: Option<FaqBook>,
}

/// Validate everything the session needs.
///
/// Unknown steps are reported but not fatal: such a step can never be
/// completed, which the operator may want to know before starting.
///
/// # Errors
///
/// Returns the first setup failure: invalid configuration, a missing model
/// file, an unreadable action model description, or an unreadable FAQ.
pub fn preflight_check(config: &AssistConfig) -> Result<PreflightReport> {
    config.validate()?;
    verify_model_paths(&config.models)?;

    let action_model = ActionModelSpec::from_file(&config.models.action_config)?;
    info!(
        "action model {} ({} classes at {}px)",
        action_model.model_id, action_model.num_classes, action_model.resolution
    );
    let unknown_steps: Vec<String> = action_model
        .unknown_steps(&config.action.steps)
        .into_iter()
        .map(str::to_owned)
        .collect();
    for step in &unknown_steps {
        warn!("step '{step}' is not a class of the action model");
    }

    let faq = if config.assistant.enabled {
        Some(FaqBook::from_file(&config.assistant.faq_path)?)
    } else {
        None
    };

    Ok(PreflightReport {
        action_model,
        unknown_steps,
        faq,
    })
}
