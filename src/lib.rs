//! signstream - real-time sign language recognition over WebSocket
//!
//! Clients stream camera frames; a single pipeline worker extracts body and
//! hand landmarks, classifies fixed-length windows of them, and streams
//! recognized words (or `"..."` when unsure) back to each client.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod server;

// Model seams
pub use model::{FeatureExtractor, MockExtractor, ScriptedClassifier, SequenceClassifier};

// Pipeline
pub use pipeline::{
    ClassList, Decision, EngineSettings, FrameSender, InferenceEngine, PipelineHandle,
    PipelineStats, ResultReceiver, SessionId,
};

// Server
pub use server::{Server, ShutdownHandle};

// Error handling
pub use error::{Result, SignError};

// Config
pub use config::{Config, ResetMode};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
