//! Default configuration constants for signstream.
//!
//! Shared by the config structs, the pipeline and the CLI so the values only
//! live in one place.

/// Default bind host (all interfaces).
pub const HOST: &str = "0.0.0.0";

/// Default WebSocket port.
pub const PORT: u16 = 8765;

/// Number of keypoint vectors in one classification window.
///
/// 30 frames is roughly one second of camera input, long enough to cover a
/// single isolated sign.
pub const SEQ_LEN: usize = 30;

/// Length of one keypoint vector.
///
/// 33 pose landmarks × (x, y, z, visibility) plus 2 × 21 hand landmarks × (x, y, z).
pub const KEYPOINT_LEN: usize = 33 * 4 + 21 * 3 * 2;

/// Minimum top-class probability for a prediction to count as a word.
pub const THRESHOLD: f32 = 0.8;

/// Oldest entries dropped from a full window under the sliding reset policy.
pub const STRIDE: usize = 5;

/// Upper bound on how long the pipeline worker waits for a frame before it
/// re-checks its running flag.
pub const POLL_INTERVAL_MS: u64 = 10;

/// How often a connection drains its result queue when no frames arrive.
pub const DRAIN_INTERVAL_MS: u64 = 50;

/// Frames are scaled to this height (aspect preserved) before extraction.
pub const FRAME_HEIGHT: u32 = 480;

/// Side length of the square image fed to the landmark model.
pub const EXTRACTOR_INPUT_SIZE: u32 = 256;

/// Largest inbound WebSocket message accepted.
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Token sent to clients when no class clears the confidence gate.
pub const UNCERTAIN_TOKEN: &str = "...";

/// How long shutdown waits for the pipeline worker and for open connections.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// How long a closing connection waits for the client to answer its close frame.
pub const CLOSE_GRACE_MS: u64 = 1000;
