//! Recognition pipeline: frames in, decisions out.
//!
//! Connection handlers push [`Frame`]s into one shared ingestion queue. A
//! single worker thread runs landmark extraction on each frame, keeps a
//! per-session sliding window, classifies full windows, and sends gated and
//! debounced [`Decision`]s back on each session's result queue.

pub mod channels;
pub mod engine;
pub mod error;
pub mod gate;
pub mod preprocess;
pub mod types;
pub mod window;
pub mod worker;

pub use channels::{FrameSender, ResultReceiver, ingestion_channel};
pub use engine::{EngineSettings, FrameOutcome, InferenceEngine, PipelineStats};
pub use error::{ErrorReporter, LogReporter, StageError};
pub use gate::{ConfidenceGate, Debouncer};
pub use preprocess::prepare;
pub use types::{
    ClassList, Decision, Frame, KeypointVector, PipelineInput, Prediction, SessionId,
};
pub use window::{ResetPolicy, Window};
pub use worker::PipelineHandle;
