//! Recoverable per-stage errors and how they get reported.

use crate::pipeline::types::SessionId;
use std::fmt;

/// Errors from a single pipeline stage.
///
/// None of these end the session or the worker; the stage that raised one
/// applies its recovery policy and the pipeline moves on to the next input.
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// Inbound payload could not be turned into a frame. The message is dropped.
    Decode(String),
    /// The extractor faulted on a frame. The frame is dropped.
    Extraction(String),
    /// The classifier failed on a window. No decision is emitted for it.
    Classification(String),
}

impl StageError {
    /// Short stage name for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Decode(_) => "decode",
            StageError::Extraction(_) => "extraction",
            StageError::Classification(_) => "classification",
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Decode(msg) => write!(f, "Decode error: {}", msg),
            StageError::Extraction(msg) => write!(f, "Extraction error: {}", msg),
            StageError::Classification(msg) => write!(f, "Classification error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error raised while handling input for `session`.
    fn report(&self, session: SessionId, error: &StageError);
}

/// Reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, session: SessionId, error: &StageError) {
        tracing::warn!(%session, stage = error.stage(), "{}", error);
    }
}
