//! Concurrent confirmation of a required set of items.

use crate::config::ConfirmationConfig;
use crate::tracking::stable::{ConfirmationStatus, StableObservationTracker};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::info;

/// Result of one [`ToolSetConfirmer::update`] tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolUpdate {
    /// Items confirmed during this tick.
    pub confirmed_now: BTreeSet<String>,
    /// One line per tracked item with something to report, in item order.
    pub status_messages: Vec<String>,
}

/// Runs an independent tracker for each required item.
///
/// Once an item is confirmed its tracker is dropped: it is never
/// re-validated and cannot be lost again.
#[derive(Debug, Clone)]
pub struct ToolSetConfirmer {
    required: BTreeSet<String>,
    trackers: BTreeMap<String, StableObservationTracker>,
    confirmed: BTreeSet<String>,
    validation: Duration,
    grace: Duration,
}

impl ToolSetConfirmer {
    /// Create a confirmer for `required` using the shared confirmation timing.
    pub fn new<I, S>(required: I, config: &ConfirmationConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            trackers: BTreeMap::new(),
            confirmed: BTreeSet::new(),
            validation: config.validation_duration(),
            grace: config.grace_period(),
        }
    }

    /// Feed the set of items seen in the current frame.
    pub fn update(&mut self, observed: &BTreeSet<String>, now: Instant) -> ToolUpdate {
        let mut update = ToolUpdate::default();

        for item in &self.required {
            if self.confirmed.contains(item) {
                continue;
            }

            let (validation, grace) = (self.validation, self.grace);
            let tracker = self
                .trackers
                .entry(item.clone())
                .or_insert_with(|| StableObservationTracker::new(validation, grace));
            let was_observing = tracker.is_observing();

            match tracker.observe(observed.contains(item), now) {
                ConfirmationStatus::Confirmed => {
                    info!("{item} confirmed");
                    update.status_messages.push(format!("{item} Confirmed!"));
                    update.confirmed_now.insert(item.clone());
                }
                ConfirmationStatus::Validating { remaining } => {
                    if was_observing {
                        update.status_messages.push(format!(
                            "Validating {item}: {:.1}s",
                            remaining.as_secs_f64()
                        ));
                    } else {
                        update
                            .status_messages
                            .push(format!("Found {item}, validating..."));
                    }
                }
                ConfirmationStatus::SearchingAfterLoss { remaining } => {
                    update.status_messages.push(format!(
                        "Searching {item}: {:.1}s",
                        remaining.as_secs_f64()
                    ));
                }
                ConfirmationStatus::NotStarted => {
                    if was_observing {
                        update
                            .status_messages
                            .push(format!("{item} validation reset"));
                    }
                }
            }
        }

        for item in &update.confirmed_now {
            self.trackers.remove(item);
            self.confirmed.insert(item.clone());
        }

        update
    }

    /// Whether every required item has been confirmed.
    pub fn is_complete(&self) -> bool {
        self.confirmed == self.required
    }

    /// Drop all per-item progress and confirmations.
    pub fn reset(&mut self) {
        self.trackers.clear();
        self.confirmed.clear();
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn confirmed(&self) -> &BTreeSet<String> {
        &self.confirmed
    }

    /// Required items not yet confirmed, in sorted order.
    pub fn still_needed(&self) -> impl Iterator<Item = &String> {
        self.required.difference(&self.confirmed)
    }

    /// The live tracker for `item`, if it is required and not yet confirmed.
    pub fn tracker(&self, item: &str) -> Option<&StableObservationTracker> {
        self.trackers.get(item)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn confirmer() -> ToolSetConfirmer {
        ToolSetConfirmer::new(["Wheel_Wrench", "Car_Jack"], &ConfirmationConfig::default())
    }

    fn seen(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn confirming_one_item_leaves_the_other_independent() {
        let mut c = confirmer();
        let base = Instant::now();

        for ms in (0..5_000).step_by(100) {
            let update = c.update(&seen(&["Car_Jack"]), at(base, ms));
            assert!(update.confirmed_now.is_empty());
        }
        let update = c.update(&seen(&["Car_Jack"]), at(base, 5_000));
        assert_eq!(update.confirmed_now, seen(&["Car_Jack"]));
        assert!(!c.is_complete());
        assert!(c.tracker("Car_Jack").is_none());

        // The wrench was never seen: no timer has started for it.
        let wrench = c.tracker("Wheel_Wrench").unwrap();
        assert!(!wrench.is_observing());
        assert_eq!(c.still_needed().collect::<Vec<_>>(), vec!["Wheel_Wrench"]);
    }

    #[test]
    fn items_validate_concurrently_and_complete_together() {
        let mut c = confirmer();
        let base = Instant::now();
        c.update(&seen(&["Car_Jack"]), base);
        c.update(&seen(&["Car_Jack", "Wheel_Wrench"]), at(base, 1_000));

        let update = c.update(&seen(&["Car_Jack", "Wheel_Wrench"]), at(base, 5_000));
        assert_eq!(update.confirmed_now, seen(&["Car_Jack"]));

        let update = c.update(&seen(&["Wheel_Wrench"]), at(base, 6_000));
        assert_eq!(update.confirmed_now, seen(&["Wheel_Wrench"]));
        assert!(c.is_complete());
    }

    #[test]
    fn confirmed_item_is_never_lost() {
        let mut c = confirmer();
        let base = Instant::now();
        c.update(&seen(&["Car_Jack"]), base);
        c.update(&seen(&["Car_Jack"]), at(base, 5_000));
        assert!(c.confirmed().contains("Car_Jack"));

        // Long absence after confirmation changes nothing.
        for ms in (5_100..20_000).step_by(500) {
            let update = c.update(&seen(&[]), at(base, ms));
            assert!(
                update
                    .status_messages
                    .iter()
                    .all(|m| !m.contains("Car_Jack"))
            );
        }
        assert!(c.confirmed().contains("Car_Jack"));
    }

    #[test]
    fn status_messages_are_sorted_and_describe_each_phase() {
        let mut c = confirmer();
        let base = Instant::now();

        let update = c.update(&seen(&["Wheel_Wrench", "Car_Jack"]), base);
        assert_eq!(
            update.status_messages,
            vec![
                "Found Car_Jack, validating...".to_owned(),
                "Found Wheel_Wrench, validating...".to_owned(),
            ]
        );

        let update = c.update(&seen(&["Wheel_Wrench"]), at(base, 1_000));
        assert_eq!(
            update.status_messages,
            vec![
                "Searching Car_Jack: 2.5s".to_owned(),
                "Validating Wheel_Wrench: 4.0s".to_owned(),
            ]
        );

        let update = c.update(&seen(&["Wheel_Wrench"]), at(base, 3_500));
        assert_eq!(
            update.status_messages,
            vec![
                "Car_Jack validation reset".to_owned(),
                "Validating Wheel_Wrench: 1.5s".to_owned(),
            ]
        );

        let update = c.update(&seen(&["Wheel_Wrench"]), at(base, 5_000));
        assert_eq!(update.status_messages, vec!["Wheel_Wrench Confirmed!"]);
    }

    #[test]
    fn reset_clears_progress_and_confirmations() {
        let mut c = confirmer();
        let base = Instant::now();
        c.update(&seen(&["Car_Jack"]), base);
        c.update(&seen(&["Car_Jack"]), at(base, 5_000));
        c.update(&seen(&["Wheel_Wrench"]), at(base, 5_100));

        c.reset();
        assert!(c.confirmed().is_empty());
        assert!(c.tracker("Wheel_Wrench").is_none());
        assert_eq!(c.still_needed().count(), 2);
    }

    #[test]
    fn empty_requirement_is_complete_immediately() {
        let c = ToolSetConfirmer::new(Vec::<String>::new(), &ConfirmationConfig::default());
        assert!(c.is_complete());
    }
}
