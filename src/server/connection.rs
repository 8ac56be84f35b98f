//! One WebSocket client: frames in, decisions out.

use crate::config::Config;
use crate::defaults;
use crate::error::{Result, SignError};
use crate::pipeline::channels::{FrameSender, ResultReceiver};
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::preprocess::prepare;
use crate::pipeline::types::{Frame, SessionId};
use crate::server::{payload, signalled};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use image::RgbImage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{WebSocketStream, accept_async_with_config};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Per-connection settings shared by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub frame_height: u32,
    pub mirror: bool,
    pub drain_interval: Duration,
    pub max_message_bytes: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_height: config.pipeline.frame_height,
            mirror: config.pipeline.mirror,
            drain_interval: Duration::from_millis(config.server.drain_interval_ms),
            max_message_bytes: config.server.max_message_bytes,
        }
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_bytes);
        config.max_frame_size = Some(self.max_message_bytes);
        config
    }
}

/// Serve one client until it disconnects or `close` flips to `true`.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session: SessionId,
    frames: FrameSender,
    settings: ConnectionSettings,
    reporter: Arc<dyn ErrorReporter>,
    mut close: watch::Receiver<bool>,
) -> Result<()> {
    let ws = accept_async_with_config(stream, Some(settings.websocket_config()))
        .await
        .map_err(|e| SignError::Connection {
            message: format!("handshake with {} failed: {}", peer, e),
        })?;
    let (mut write, mut read) = ws.split();

    let results = frames.open_session(session)?;
    tracing::info!(%session, %peer, "client connected");

    let mut ticker = tokio::time::interval(settings.drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sequence = 0u64;

    let outcome: Result<()> = loop {
        tokio::select! {
            message = read.next() => {
                let decoded = match message {
                    Some(Ok(Message::Text(text))) => {
                        decode_off_runtime(move || payload::decode_text(&text), settings).await
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        decode_off_runtime(move || payload::decode_bytes(&bytes), settings).await
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break Err(SignError::Connection {
                        message: format!("receive from {} failed: {}", peer, e),
                    }),
                };

                match decoded {
                    Ok(image) => {
                        if frames.submit(Frame::new(image, session, sequence)).is_err() {
                            // Worker is gone, so shutdown is under way and its
                            // output for this session is already queued
                            tracing::debug!(%session, "pipeline stopped while client was streaming");
                            break close_gracefully(&results, &mut write, &mut read, session).await;
                        }
                        sequence += 1;
                    }
                    Err(e) => reporter.report(session, &e),
                }

                if let Err(e) = forward_results(&results, &mut write).await {
                    break Err(e);
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = forward_results(&results, &mut write).await {
                    break Err(e);
                }
            }
            _ = signalled(&mut close) => {
                // The worker has already drained
                break close_gracefully(&results, &mut write, &mut read, session).await;
            }
        }
    };

    if frames.close_session(session).is_err() {
        tracing::debug!(%session, "pipeline already stopped");
    }
    match &outcome {
        Ok(()) => tracing::info!(%session, %peer, frames = sequence, "client disconnected"),
        Err(e) => tracing::warn!(%session, %peer, frames = sequence, "connection ended: {}", e),
    }
    outcome
}

/// Image decoding and resizing are CPU work; keep them off the async workers.
async fn decode_off_runtime<F>(
    decode: F,
    settings: ConnectionSettings,
) -> std::result::Result<RgbImage, StageError>
where
    F: FnOnce() -> std::result::Result<RgbImage, StageError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        decode().map(|image| prepare(image, settings.frame_height, settings.mirror))
    })
    .await
    .map_err(|e| StageError::Decode(format!("decoder task failed: {}", e)))?
}

/// Flush pending decisions, send a close frame, then give the client a
/// moment to answer it.
async fn close_gracefully(
    results: &ResultReceiver,
    write: &mut WsSink,
    read: &mut WsStream,
    session: SessionId,
) -> Result<()> {
    let flushed = forward_results(results, write).await;
    if let Err(e) = write.close().await {
        tracing::debug!(%session, "close frame not delivered: {}", e);
        return flushed;
    }
    let grace = Duration::from_millis(defaults::CLOSE_GRACE_MS);
    let reply = tokio::time::timeout(grace, async {
        while let Some(Ok(message)) = read.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    if reply.is_err() {
        tracing::debug!(%session, "client did not answer the close frame");
    }
    flushed
}

async fn forward_results(results: &ResultReceiver, write: &mut WsSink) -> Result<()> {
    for decision in results.drain() {
        write
            .send(Message::Text(decision.as_text().to_string()))
            .await
            .map_err(|e| SignError::Connection {
                message: format!("send failed: {}", e),
            })?;
    }
    Ok(())
}
