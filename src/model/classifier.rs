//! Window classification into class probabilities.

use crate::pipeline::types::{KeypointVector, Prediction};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Errors from a classifier invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("expected {expected} keypoint vectors, got {actual}")]
    WindowLength { expected: usize, actual: usize },

    #[error("expected keypoint vectors of length {expected}, got {actual}")]
    KeypointLength { expected: usize, actual: usize },

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Trait for sequence classification.
///
/// Takes exactly `seq_len` keypoint vectors in temporal order and returns one
/// probability per class.
pub trait SequenceClassifier: Send + 'static {
    fn classify(&mut self, window: &[KeypointVector]) -> Result<Prediction, ClassifyError>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Check a window against the expected shape before running a model on it.
pub fn check_window(
    window: &[KeypointVector],
    seq_len: usize,
    keypoint_len: usize,
) -> Result<(), ClassifyError> {
    if window.len() != seq_len {
        return Err(ClassifyError::WindowLength {
            expected: seq_len,
            actual: window.len(),
        });
    }
    if let Some(bad) = window.iter().find(|v| v.len() != keypoint_len) {
        return Err(ClassifyError::KeypointLength {
            expected: keypoint_len,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Classifier test double returning scripted distributions.
///
/// Each call returns the next distribution in the script; the last one repeats
/// once the script is exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedClassifier {
    script: Vec<Vec<f32>>,
    fail_on: HashSet<usize>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedClassifier {
    /// Always return `probabilities`.
    pub fn constant(probabilities: Vec<f32>) -> Self {
        Self::scripted(vec![probabilities])
    }

    pub fn scripted(script: Vec<Vec<f32>>) -> Self {
        Self {
            script,
            fail_on: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the given call (0-based).
    pub fn with_failure_on(mut self, call: usize) -> Self {
        self.fail_on.insert(call);
        self
    }

    /// Counter of `classify` calls, shared with clones.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl SequenceClassifier for ScriptedClassifier {
    fn classify(&mut self, window: &[KeypointVector]) -> Result<Prediction, ClassifyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if window.is_empty() {
            return Err(ClassifyError::WindowLength {
                expected: 1,
                actual: 0,
            });
        }
        if self.fail_on.contains(&call) {
            return Err(ClassifyError::Inference(format!(
                "scripted failure on call {}",
                call
            )));
        }
        let index = call.min(self.script.len().saturating_sub(1));
        let probabilities = self.script.get(index).cloned().unwrap_or_default();
        Ok(Prediction::new(probabilities))
    }

    fn name(&self) -> &str {
        "scripted-classifier"
    }
}
