//! The pipeline worker thread.
//!
//! Model inference is blocking and CPU-bound, so it runs on a dedicated OS
//! thread fed by the ingestion channel rather than on the async runtime.

use crate::error::Result;
use crate::pipeline::channels::{FrameSender, ingestion_channel};
use crate::pipeline::engine::{InferenceEngine, PipelineStats};
use crate::pipeline::types::PipelineInput;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to the running worker.
pub struct PipelineHandle {
    sender: FrameSender,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<PipelineStats>>,
}

impl PipelineHandle {
    /// Start the worker thread. Models are already loaded inside `engine`.
    pub fn start(engine: InferenceEngine, poll_interval: Duration) -> Result<Self> {
        let (sender, rx) = ingestion_channel();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = thread::Builder::new()
            .name("signstream-pipeline".to_string())
            .spawn(move || run(engine, rx, flag, poll_interval))?;

        Ok(Self {
            sender,
            running,
            thread: Some(thread),
        })
    }

    /// A new producer for the ingestion queue.
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the worker after it has drained what is already queued.
    ///
    /// Sends the end-of-stream marker, then waits up to `timeout` for the
    /// thread. Returns the final counters, or `None` if the worker panicked or
    /// did not finish in time (it is then detached).
    pub fn stop(mut self, timeout: Duration) -> Option<PipelineStats> {
        if self.sender.end_of_stream().is_err() {
            tracing::debug!("pipeline worker already gone");
        }
        let thread = self.thread.take()?;

        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(10);
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                self.running.store(false, Ordering::SeqCst);
                tracing::warn!(
                    pending = self.sender.pending(),
                    "pipeline worker did not stop in {:?}, detaching",
                    timeout
                );
                return None;
            }
            thread::sleep(poll_interval);
        }
        self.running.store(false, Ordering::SeqCst);

        match thread.join() {
            Ok(stats) => Some(stats),
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic");
                tracing::error!("pipeline worker panicked: {msg}");
                None
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn run(
    mut engine: InferenceEngine,
    rx: Receiver<PipelineInput>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) -> PipelineStats {
    tracing::info!(
        seq_len = engine.settings().seq_len,
        threshold = engine.settings().threshold,
        classes = engine.classes().len(),
        "pipeline worker started"
    );

    loop {
        match rx.recv_timeout(poll_interval) {
            Ok(input) => {
                if engine.handle(input).is_break() {
                    tracing::debug!("end of stream");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = engine.finish();
    tracing::info!(
        frames = stats.frames,
        dropped = stats.frames_dropped,
        windows = stats.windows,
        emitted = stats.emitted,
        "pipeline worker stopped"
    );
    stats
}
