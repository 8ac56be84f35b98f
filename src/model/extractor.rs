//! Per-frame landmark extraction.

use crate::pipeline::types::KeypointVector;
use image::RgbImage;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Why an extractor produced no keypoints for a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// The model ran but found no body or hands. The pipeline zero-fills.
    #[error("no landmarks detected")]
    NoDetection,
    /// The model itself failed. The pipeline drops the frame.
    #[error("extractor fault: {0}")]
    Fault(String),
}

/// Trait for landmark extraction.
///
/// Implementations may keep tracker state between calls (temporal smoothing);
/// [`FeatureExtractor::reset`] clears it when a session ends. Only the pipeline
/// worker calls into an extractor, so `&mut self` is enough.
pub trait FeatureExtractor: Send + 'static {
    /// Extract one keypoint vector of length [`FeatureExtractor::keypoint_len`].
    fn extract(&mut self, image: &RgbImage) -> Result<KeypointVector, ExtractError>;

    /// Length of every vector this extractor produces.
    fn keypoint_len(&self) -> usize;

    /// Clear tracker state carried across frames.
    fn reset(&mut self) {}

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Mock extractor for testing.
///
/// Returns a constant vector and can be scripted to fault or miss on given
/// call indices (0-based).
#[derive(Debug, Clone)]
pub struct MockExtractor {
    keypoint_len: usize,
    value: f32,
    fault_on: HashSet<usize>,
    miss_on: HashSet<usize>,
    calls: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
}

impl MockExtractor {
    pub fn new(keypoint_len: usize) -> Self {
        Self {
            keypoint_len,
            value: 0.5,
            fault_on: HashSet::new(),
            miss_on: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fill every returned vector with `value`.
    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }

    /// Fault on the given call.
    pub fn with_fault_on(mut self, call: usize) -> Self {
        self.fault_on.insert(call);
        self
    }

    /// Report no detection on the given call.
    pub fn with_no_detection_on(mut self, call: usize) -> Self {
        self.miss_on.insert(call);
        self
    }

    /// Counter of `extract` calls, shared with clones.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Counter of `reset` calls, shared with clones.
    pub fn reset_counter(&self) -> Arc<AtomicUsize> {
        self.resets.clone()
    }
}

impl FeatureExtractor for MockExtractor {
    fn extract(&mut self, _image: &RgbImage) -> Result<KeypointVector, ExtractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fault_on.contains(&call) {
            return Err(ExtractError::Fault(format!("mock fault on call {}", call)));
        }
        if self.miss_on.contains(&call) {
            return Err(ExtractError::NoDetection);
        }
        Ok(KeypointVector::new(vec![self.value; self.keypoint_len]))
    }

    fn keypoint_len(&self) -> usize {
        self.keypoint_len
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock-extractor"
    }
}
