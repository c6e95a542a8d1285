//! Debounce / grace-period tracker for a noisy per-tick presence signal.
//!
//! A detection only counts once it has been seen for a sustained window.
//! Short dropouts (occlusion, detector flicker) pause nothing: the window
//! keeps running as long as the object comes back within the grace period.

use crate::config::ConfirmationConfig;
use std::time::{Duration, Instant};

/// Outcome of a single [`StableObservationTracker::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Nothing is being tracked.
    NotStarted,
    /// Object present; `remaining` until confirmation.
    Validating { remaining: Duration },
    /// Sustained presence confirmed. Terminal until [`StableObservationTracker::reset`].
    Confirmed,
    /// Object missing; `remaining` grace before progress is discarded.
    SearchingAfterLoss { remaining: Duration },
}

/// Raw timer state of a tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationState {
    /// When the current uninterrupted-enough observation window began.
    pub observing_since: Option<Instant>,
    /// When the object was last lost, while an observation window is open.
    pub lost_since: Option<Instant>,
    /// Whether the window completed.
    pub confirmed: bool,
}

/// Converts "observed this tick" booleans into a confirmed / not-confirmed state.
#[derive(Debug, Clone)]
pub struct StableObservationTracker {
    state: ConfirmationState,
    validation: Duration,
    grace: Duration,
}

impl StableObservationTracker {
    /// Create a tracker requiring `validation` of presence and tolerating
    /// absences shorter than `grace`.
    pub fn new(validation: Duration, grace: Duration) -> Self {
        Self {
            state: ConfirmationState::default(),
            validation,
            grace,
        }
    }

    /// Create a tracker from the shared confirmation settings.
    pub fn from_config(config: &ConfirmationConfig) -> Self {
        Self::new(config.validation_duration(), config.grace_period())
    }

    /// Feed one tick of evidence.
    pub fn observe(&mut self, is_present: bool, now: Instant) -> ConfirmationStatus {
        if self.state.confirmed {
            return ConfirmationStatus::Confirmed;
        }

        if is_present {
            self.state.lost_since = None;
            let since = *self.state.observing_since.get_or_insert(now);
            let elapsed = now.saturating_duration_since(since);
            if elapsed >= self.validation {
                self.state = ConfirmationState {
                    observing_since: None,
                    lost_since: None,
                    confirmed: true,
                };
                return ConfirmationStatus::Confirmed;
            }
            return ConfirmationStatus::Validating {
                remaining: self.validation - elapsed,
            };
        }

        if self.state.observing_since.is_none() {
            return ConfirmationStatus::NotStarted;
        }

        let lost = *self.state.lost_since.get_or_insert(now);
        let gap = now.saturating_duration_since(lost);
        if gap < self.grace {
            ConfirmationStatus::SearchingAfterLoss {
                remaining: self.grace - gap,
            }
        } else {
            self.state.observing_since = None;
            self.state.lost_since = None;
            ConfirmationStatus::NotStarted
        }
    }

    /// Discard all progress, including a confirmation.
    pub fn reset(&mut self) {
        self.state = ConfirmationState::default();
    }

    pub fn is_confirmed(&self) -> bool {
        self.state.confirmed
    }

    /// Whether an observation window is open (including during a grace period).
    pub fn is_observing(&self) -> bool {
        self.state.observing_since.is_some()
    }

    pub fn state(&self) -> &ConfirmationState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn tracker() -> StableObservationTracker {
        StableObservationTracker::new(Duration::from_secs(5), Duration::from_millis(2_500))
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn absent_without_window_stays_not_started() {
        let mut t = tracker();
        let base = Instant::now();
        assert_eq!(t.observe(false, base), ConfirmationStatus::NotStarted);
        assert_eq!(t.state(), &ConfirmationState::default());
    }

    #[test]
    fn sustained_presence_confirms_at_validation_duration() {
        let mut t = tracker();
        let base = Instant::now();
        for ms in (0..5_000).step_by(100) {
            let status = t.observe(true, at(base, ms));
            assert_eq!(
                status,
                ConfirmationStatus::Validating {
                    remaining: Duration::from_millis(5_000 - ms)
                }
            );
        }
        assert_eq!(t.observe(true, at(base, 5_000)), ConfirmationStatus::Confirmed);
        assert!(t.is_confirmed());
        assert!(!t.is_observing());
    }

    #[test]
    fn short_gaps_do_not_restart_the_window() {
        let mut t = tracker();
        let base = Instant::now();
        t.observe(true, base);
        assert!(matches!(
            t.observe(false, at(base, 1_000)),
            ConfirmationStatus::SearchingAfterLoss { .. }
        ));
        // 2.4s of absence is still inside the grace period.
        assert_eq!(
            t.observe(false, at(base, 3_400)),
            ConfirmationStatus::SearchingAfterLoss {
                remaining: Duration::from_millis(100)
            }
        );
        assert_eq!(
            t.observe(true, at(base, 3_500)),
            ConfirmationStatus::Validating {
                remaining: Duration::from_millis(1_500)
            }
        );
        assert!(t.state().lost_since.is_none());
        assert_eq!(t.observe(true, at(base, 5_000)), ConfirmationStatus::Confirmed);
    }

    #[test]
    fn gap_reaching_grace_period_discards_progress() {
        let mut t = tracker();
        let base = Instant::now();
        t.observe(true, base);
        t.observe(true, at(base, 4_000));
        t.observe(false, at(base, 4_100));
        assert_eq!(
            t.observe(false, at(base, 6_600)),
            ConfirmationStatus::NotStarted
        );
        assert!(!t.is_observing());

        // A fresh full window is required.
        assert_eq!(
            t.observe(true, at(base, 7_000)),
            ConfirmationStatus::Validating {
                remaining: Duration::from_secs(5)
            }
        );
        assert!(matches!(
            t.observe(true, at(base, 11_900)),
            ConfirmationStatus::Validating { .. }
        ));
        assert_eq!(t.observe(true, at(base, 12_000)), ConfirmationStatus::Confirmed);
    }

    #[test]
    fn confirmed_is_terminal_until_reset() {
        let mut t = tracker();
        let base = Instant::now();
        t.observe(true, base);
        assert_eq!(t.observe(true, at(base, 5_000)), ConfirmationStatus::Confirmed);
        for ms in [5_100, 9_000, 60_000] {
            assert_eq!(t.observe(false, at(base, ms)), ConfirmationStatus::Confirmed);
        }
        assert_eq!(t.observe(true, at(base, 61_000)), ConfirmationStatus::Confirmed);

        t.reset();
        assert!(!t.is_confirmed());
        assert_eq!(
            t.observe(false, at(base, 62_000)),
            ConfirmationStatus::NotStarted
        );
    }

    #[test]
    fn flickering_detector_still_confirms() {
        let mut t = tracker();
        let base = Instant::now();
        let mut confirmed_at = None;
        for tick in 0..100_u64 {
            let present = tick % 3 != 2;
            if t.observe(present, at(base, tick * 100)) == ConfirmationStatus::Confirmed {
                confirmed_at = Some(tick);
                break;
            }
        }
        // Tick 50 (t = 5.0s) is a dropout, so confirmation lands on tick 51.
        assert_eq!(confirmed_at, Some(51));
    }

    #[test]
    fn from_config_uses_configured_durations() {
        let config = ConfirmationConfig {
            validation_duration_secs: 1.0,
            grace_period_secs: 0.5,
        };
        let mut t = StableObservationTracker::from_config(&config);
        let base = Instant::now();
        t.observe(true, base);
        t.observe(false, at(base, 100));
        assert_eq!(t.observe(false, at(base, 600)), ConfirmationStatus::NotStarted);
        t.observe(true, at(base, 700));
        assert_eq!(t.observe(true, at(base, 1_700)), ConfirmationStatus::Confirmed);
    }
}
