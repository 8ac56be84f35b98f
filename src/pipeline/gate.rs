//! Confidence gating and debounce.

use crate::pipeline::types::{ClassList, Decision, Prediction};

/// Turns a probability distribution into a word or [`Decision::Uncertain`].
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// The threshold is inclusive: `p == threshold` is confident.
    pub fn decide(&self, prediction: &Prediction, classes: &ClassList) -> Decision {
        match prediction.argmax() {
            Some((index, p)) if p >= self.threshold => classes
                .get(index)
                .map(|word| Decision::Word(word.to_string()))
                .unwrap_or(Decision::Uncertain),
            _ => Decision::Uncertain,
        }
    }
}

/// Suppresses a decision identical to the previous one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    enabled: bool,
    last: Option<Decision>,
}

impl Debouncer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last: None,
        }
    }

    /// Returns the candidate if it should be emitted.
    ///
    /// The remembered decision is updated whether or not the candidate is
    /// suppressed.
    pub fn admit(&mut self, candidate: Decision) -> Option<Decision> {
        let repeat = self.last.as_ref() == Some(&candidate);
        self.last = Some(candidate.clone());
        if self.enabled && repeat {
            None
        } else {
            Some(candidate)
        }
    }

    pub fn last(&self) -> Option<&Decision> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> ClassList {
        ClassList::new(vec!["HELLO".into(), "THANKS".into(), "YES".into()]).unwrap()
    }

    fn word(w: &str) -> Decision {
        Decision::Word(w.to_string())
    }

    #[test]
    fn test_confident_prediction_yields_word() {
        let gate = ConfidenceGate::new(0.8);
        let decision = gate.decide(&Prediction::new(vec![0.05, 0.9, 0.05]), &classes());
        assert_eq!(decision, word("THANKS"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gate = ConfidenceGate::new(0.75);
        let at = gate.decide(&Prediction::new(vec![0.75, 0.25, 0.0]), &classes());
        assert_eq!(at, word("HELLO"));

        let below = 0.75_f32 - f32::EPSILON;
        let under = gate.decide(&Prediction::new(vec![below, 0.2, 0.05]), &classes());
        assert_eq!(under, Decision::Uncertain);
    }

    #[test]
    fn test_low_confidence_is_uncertain() {
        let gate = ConfidenceGate::new(0.8);
        let decision = gate.decide(&Prediction::new(vec![0.5, 0.3, 0.2]), &classes());
        assert_eq!(decision, Decision::Uncertain);
    }

    #[test]
    fn test_empty_prediction_is_uncertain() {
        let gate = ConfidenceGate::new(0.0);
        assert_eq!(
            gate.decide(&Prediction::new(vec![]), &classes()),
            Decision::Uncertain
        );
    }

    #[test]
    fn test_debounce_suppresses_repeats() {
        let mut debouncer = Debouncer::new(true);
        assert_eq!(debouncer.admit(word("HELLO")), Some(word("HELLO")));
        assert_eq!(debouncer.admit(word("HELLO")), None);
        assert_eq!(debouncer.admit(word("HELLO")), None);
        assert_eq!(debouncer.admit(Decision::Uncertain), Some(Decision::Uncertain));
        assert_eq!(debouncer.admit(Decision::Uncertain), None);
        // Same word after a change is emitted again
        assert_eq!(debouncer.admit(word("HELLO")), Some(word("HELLO")));
    }

    #[test]
    fn test_disabled_debounce_emits_everything() {
        let mut debouncer = Debouncer::new(false);
        for _ in 0..3 {
            assert_eq!(debouncer.admit(word("YES")), Some(word("YES")));
        }
        assert_eq!(debouncer.last(), Some(&word("YES")));
    }
}
