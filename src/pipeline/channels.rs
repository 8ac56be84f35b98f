//! Channels between connection handlers and the pipeline worker.
//!
//! One unbounded ingestion queue carries frames from every connection to the
//! single worker. Each session gets its own result queue back.

use crate::error::{Result, SignError};
use crate::pipeline::types::{Decision, Frame, PipelineInput, SessionId};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::time::Duration;

/// Create the shared ingestion queue.
pub fn ingestion_channel() -> (FrameSender, Receiver<PipelineInput>) {
    let (tx, rx) = unbounded();
    (FrameSender { tx }, rx)
}

/// Producer side of the ingestion queue. Cheap to clone, one per connection.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: Sender<PipelineInput>,
}

impl FrameSender {
    /// Register a session with the worker and return its result queue.
    pub fn open_session(&self, session: SessionId) -> Result<ResultReceiver> {
        let (results, rx) = unbounded();
        self.send(PipelineInput::Open { session, results })?;
        Ok(ResultReceiver { rx })
    }

    pub fn submit(&self, frame: Frame) -> Result<()> {
        self.send(PipelineInput::Frame(frame))
    }

    pub fn close_session(&self, session: SessionId) -> Result<()> {
        self.send(PipelineInput::Close { session })
    }

    /// Ask the worker to exit once it has handled everything queued so far.
    pub fn end_of_stream(&self) -> Result<()> {
        self.send(PipelineInput::EndOfStream)
    }

    /// Messages waiting for the worker.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    fn send(&self, input: PipelineInput) -> Result<()> {
        self.tx.send(input).map_err(|_| SignError::Pipeline {
            message: "pipeline worker has stopped".to_string(),
        })
    }
}

/// Consumer side of one session's result queue.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: Receiver<Decision>,
}

impl ResultReceiver {
    /// Everything available right now, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<Decision> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next decision.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Decision> {
        match self.rx.recv_timeout(timeout) {
            Ok(decision) => Some(decision),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// True once the worker has dropped this session's sender and the queue is empty.
    pub fn is_closed(&self) -> bool {
        self.rx.is_empty() && matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_open_session_sends_open_message() {
        let (sender, rx) = ingestion_channel();
        let _results = sender.open_session(SessionId(4)).unwrap();
        match rx.try_recv().unwrap() {
            PipelineInput::Open { session, .. } => assert_eq!(session, SessionId(4)),
            other => panic!("expected Open, got {:?}", other),
        }
    }

    #[test]
    fn test_inputs_arrive_in_order() {
        let (sender, rx) = ingestion_channel();
        let other = sender.clone();
        sender
            .submit(Frame::new(RgbImage::new(1, 1), SessionId(1), 0))
            .unwrap();
        other.close_session(SessionId(1)).unwrap();
        sender.end_of_stream().unwrap();
        assert_eq!(sender.pending(), 3);

        assert!(matches!(rx.recv().unwrap(), PipelineInput::Frame(f) if f.sequence == 0));
        assert!(matches!(rx.recv().unwrap(), PipelineInput::Close { .. }));
        assert!(matches!(rx.recv().unwrap(), PipelineInput::EndOfStream));
    }

    #[test]
    fn test_send_after_worker_gone_fails() {
        let (sender, rx) = ingestion_channel();
        drop(rx);
        let result = sender.end_of_stream();
        assert!(matches!(result, Err(SignError::Pipeline { .. })));
    }

    #[test]
    fn test_result_receiver_drain_is_fifo_and_non_blocking() {
        let (sender, rx) = ingestion_channel();
        let results = sender.open_session(SessionId(1)).unwrap();
        let PipelineInput::Open { results: tx, .. } = rx.recv().unwrap() else {
            panic!("expected Open");
        };

        assert!(results.drain().is_empty());
        tx.send(Decision::Word("HELLO".into())).unwrap();
        tx.send(Decision::Uncertain).unwrap();
        assert_eq!(
            results.drain(),
            vec![Decision::Word("HELLO".into()), Decision::Uncertain]
        );
        assert!(!results.is_closed());

        drop(tx);
        assert!(results.is_closed());
        assert_eq!(results.recv_timeout(Duration::from_millis(10)), None);
    }
}
