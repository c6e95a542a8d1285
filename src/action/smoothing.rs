//! Majority-vote smoothing of per-frame action labels.

use crate::error::Result;
use crate::vision::{ActionClassifier, ActionPrediction, Frame, NormalizedFrame};
use std::collections::VecDeque;

/// Reports the most frequent label among the last `window` labels.
///
/// Ties go to the label that first appears earliest in the window.
#[derive(Debug, Clone)]
pub struct LabelSmoother {
    window: usize,
    history: VecDeque<String>,
}

impl LabelSmoother {
    /// A window of 0 or 1 passes labels through unchanged.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            history: VecDeque::with_capacity(window.max(1)),
        }
    }

    /// Record `label` and return the current mode.
    pub fn push(&mut self, label: &str) -> String {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(label.to_owned());
        self.mode().unwrap_or_else(|| label.to_owned())
    }

    fn mode(&self) -> Option<String> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for label in &self.history {
            match counts.iter_mut().find(|(l, _)| *l == label.as_str()) {
                Some((_, n)) => *n += 1,
                None => counts.push((label.as_str(), 1)),
            }
        }
        let mut best: Option<(&str, usize)> = None;
        for (label, n) in counts {
            if best.is_none_or(|(_, b)| n > b) {
                best = Some((label, n));
            }
        }
        best.map(|(label, _)| label.to_owned())
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Wraps a classifier and fills [`ActionPrediction::smoothed_label`].
///
/// Resetting the classifier state also forgets the label history.
pub struct SmoothedClassifier<C> {
    inner: C,
    smoother: LabelSmoother,
}

impl<C: ActionClassifier> SmoothedClassifier<C> {
    pub fn new(inner: C, window: usize) -> Self {
        Self {
            inner,
            smoother: LabelSmoother::new(window),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: ActionClassifier> ActionClassifier for SmoothedClassifier<C> {
    fn resolution(&self) -> u32 {
        self.inner.resolution()
    }

    fn format(&self, frame: &Frame) -> Result<NormalizedFrame> {
        self.inner.format(frame)
    }

    fn predict(&mut self, input: &NormalizedFrame) -> Result<ActionPrediction> {
        let mut prediction = self.inner.predict(input)?;
        prediction.smoothed_label = self.smoother.push(&prediction.label);
        Ok(prediction)
    }

    fn reset_state(&mut self) {
        self.inner.reset_state();
        self.smoother.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn reports_majority_of_window() {
        let mut s = LabelSmoother::new(5);
        s.push("remove_tire");
        s.push("lower_car");
        assert_eq!(s.push("lower_car"), "lower_car");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn ties_go_to_earliest_label() {
        let mut s = LabelSmoother::new(4);
        s.push("a");
        s.push("b");
        s.push("b");
        assert_eq!(s.push("a"), "a");
    }

    #[test]
    fn old_labels_fall_out_of_the_window() {
        let mut s = LabelSmoother::new(3);
        for _ in 0..3 {
            s.push("loosen_bolts");
        }
        s.push("lift_car_with_jack");
        assert_eq!(s.push("lift_car_with_jack"), "lift_car_with_jack");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn window_of_one_passes_through() {
        let mut s = LabelSmoother::new(0);
        assert_eq!(s.push("a"), "a");
        assert_eq!(s.push("b"), "b");
    }

    struct Scripted {
        labels: Vec<&'static str>,
        resets: usize,
    }

    impl ActionClassifier for Scripted {
        fn resolution(&self) -> u32 {
            4
        }

        fn predict(&mut self, _input: &NormalizedFrame) -> Result<ActionPrediction> {
            let label = self.labels.remove(0).to_owned();
            Ok(ActionPrediction {
                smoothed_label: label.clone(),
                label,
                confidence: 0.9,
                probabilities: Vec::new(),
            })
        }

        fn reset_state(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn adapter_smooths_and_forgets_on_reset() {
        let inner = Scripted {
            labels: vec!["a", "a", "b", "b"],
            resets: 0,
        };
        let mut c = SmoothedClassifier::new(inner, 15);
        let input = NormalizedFrame {
            resolution: 4,
            data: vec![0.0; 48],
        };
        c.predict(&input).unwrap();
        c.predict(&input).unwrap();
        let p = c.predict(&input).unwrap();
        assert_eq!(p.label, "b");
        assert_eq!(p.smoothed_label, "a");

        c.reset_state();
        let p = c.predict(&input).unwrap();
        assert_eq!(p.smoothed_label, "b");
        assert_eq!(c.into_inner().resets, 1);
    }
}
