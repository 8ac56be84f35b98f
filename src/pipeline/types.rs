//! Data types flowing through the recognition pipeline.

use crate::defaults;
use crate::error::{Result, SignError};
use crossbeam_channel::Sender;
use image::RgbImage;
use std::fmt;
use std::time::Instant;

/// Identifies one client connection's frame stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A decoded camera frame owned by the pipeline once submitted.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixels, already scaled and mirrored for the extractor.
    pub image: RgbImage,
    /// Session that produced this frame.
    pub session: SessionId,
    /// Per-session sequence number for ordering and gap detection.
    pub sequence: u64,
    /// When the frame was received from the network.
    pub received: Instant,
}

impl Frame {
    /// Creates a new frame stamped with the current time.
    pub fn new(image: RgbImage, session: SessionId, sequence: u64) -> Self {
        Self {
            image,
            session,
            sequence,
            received: Instant::now(),
        }
    }
}

/// Landmark coordinates for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointVector(Vec<f32>);

impl KeypointVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// The stand-in used when no landmarks were detected.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Classifier output: one probability per entry of the [`ClassList`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    probabilities: Vec<f32>,
}

impl Prediction {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self { probabilities }
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Index and probability of the most likely class.
    ///
    /// Ties go to the lowest index. NaN entries never win. Returns `None` when
    /// there is no finite entry.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &p) in self.probabilities.iter().enumerate() {
            if p.is_nan() {
                continue;
            }
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((index, p)),
            }
        }
        best
    }
}

/// Ordered vocabulary the classifier was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassList(Vec<String>);

impl ClassList {
    /// Builds a class list, rejecting empty vocabularies and blank names.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(SignError::ClassList {
                message: "class list is empty".to_string(),
            });
        }
        if let Some(position) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(SignError::ClassList {
                message: format!("class {} has a blank name", position),
            });
        }
        Ok(Self(names))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Outcome of gating one prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A class cleared the confidence threshold.
    Word(String),
    /// Nothing was confident enough.
    Uncertain,
}

impl Decision {
    /// Text sent to the client for this decision.
    pub fn as_text(&self) -> &str {
        match self {
            Decision::Word(word) => word,
            Decision::Uncertain => defaults::UNCERTAIN_TOKEN,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// Messages carried by the frame ingestion channel.
#[derive(Debug)]
pub enum PipelineInput {
    /// Register a session and the queue its decisions are delivered to.
    Open {
        session: SessionId,
        results: Sender<Decision>,
    },
    /// One frame to extract features from.
    Frame(Frame),
    /// Drop the session's window and decision state.
    Close { session: SessionId },
    /// Stop the worker.
    EndOfStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId(7).to_string(), "session-7");
    }

    #[test]
    fn test_keypoint_zeros() {
        let zeros = KeypointVector::zeros(4);
        assert_eq!(zeros.len(), 4);
        assert!(zeros.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_argmax_picks_highest() {
        let prediction = Prediction::new(vec![0.1, 0.7, 0.2]);
        assert_eq!(prediction.argmax(), Some((1, 0.7)));
    }

    #[test]
    fn test_argmax_tie_goes_to_lowest_index() {
        let prediction = Prediction::new(vec![0.4, 0.4, 0.2]);
        assert_eq!(prediction.argmax(), Some((0, 0.4)));
    }

    #[test]
    fn test_argmax_skips_nan() {
        let prediction = Prediction::new(vec![f32::NAN, 0.3, f32::NAN]);
        assert_eq!(prediction.argmax(), Some((1, 0.3)));

        let all_nan = Prediction::new(vec![f32::NAN, f32::NAN]);
        assert_eq!(all_nan.argmax(), None);
        assert_eq!(Prediction::new(vec![]).argmax(), None);
    }

    #[test]
    fn test_class_list_rejects_empty_and_blank() {
        assert!(ClassList::new(vec![]).is_err());
        assert!(ClassList::new(vec!["HELLO".to_string(), "  ".to_string()]).is_err());

        let classes = ClassList::new(vec!["HELLO".to_string(), "THANKS".to_string()]).unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.get(1), Some("THANKS"));
        assert_eq!(classes.get(2), None);
        assert_eq!(classes.iter().collect::<Vec<_>>(), vec!["HELLO", "THANKS"]);
    }

    #[test]
    fn test_decision_text() {
        assert_eq!(Decision::Word("HELLO".to_string()).as_text(), "HELLO");
        assert_eq!(Decision::Uncertain.as_text(), "...");
        assert_eq!(Decision::Uncertain.to_string(), "...");
    }
}
