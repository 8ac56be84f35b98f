//! Fixed-length temporal window of keypoint vectors.

use crate::config::{PipelineSettings, ResetMode};
use crate::pipeline::types::KeypointVector;
use std::collections::VecDeque;

/// What a window keeps after it has been sampled for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Discard everything; the next prediction uses only new frames.
    Full,
    /// Drop the `stride` oldest entries so consecutive predictions overlap.
    Sliding { stride: usize },
}

impl ResetPolicy {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        match settings.reset {
            ResetMode::Full => ResetPolicy::Full,
            ResetMode::Sliding => ResetPolicy::Sliding {
                stride: settings.stride,
            },
        }
    }
}

/// Bounded buffer of per-frame features awaiting classification.
///
/// Length stays within `[0, capacity]`. The push that fills the window returns
/// a snapshot of all `capacity` entries and applies the reset policy before
/// returning, so the buffer is ready for the next cycle while the snapshot is
/// classified.
#[derive(Debug)]
pub struct Window {
    entries: VecDeque<KeypointVector>,
    capacity: usize,
    policy: ResetPolicy,
}

impl Window {
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize, policy: ResetPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Appends one vector. Returns the full window when this push completed it.
    pub fn push(&mut self, keypoints: KeypointVector) -> Option<Vec<KeypointVector>> {
        self.entries.push_back(keypoints);
        if self.entries.len() < self.capacity {
            return None;
        }

        let snapshot = match self.policy {
            ResetPolicy::Full => self.entries.drain(..).collect(),
            ResetPolicy::Sliding { stride } => {
                let snapshot: Vec<KeypointVector> = self.entries.iter().cloned().collect();
                let drop = stride.clamp(1, self.capacity);
                self.entries.drain(..drop);
                snapshot
            }
        };
        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

}
