//! WebSocket front end.
//!
//! [`Server::bind`] opens the listener and starts the pipeline worker;
//! [`Server::run`] accepts clients until a [`ShutdownHandle`] fires, then
//! tears down in order: stop accepting, drain and join the worker, close
//! every connection.

pub mod connection;
pub mod payload;

pub use connection::{ConnectionSettings, handle_connection};

use crate::config::Config;
use crate::defaults;
use crate::error::{Result, SignError};
use crate::pipeline::engine::{InferenceEngine, PipelineStats};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::types::SessionId;
use crate::pipeline::worker::PipelineHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Triggers a graceful server shutdown. Clone freely.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct Server {
    listener: TcpListener,
    pipeline: PipelineHandle,
    settings: ConnectionSettings,
    reporter: Arc<dyn ErrorReporter>,
    shutdown: ShutdownHandle,
    shutdown_timeout: Duration,
}

impl Server {
    /// Bind the listener and start the pipeline worker around `engine`.
    pub async fn bind(config: &Config, engine: InferenceEngine) -> Result<Self> {
        let address = config.server.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| SignError::Bind {
                address: address.clone(),
                message: e.to_string(),
            })?;

        let pipeline = PipelineHandle::start(
            engine,
            Duration::from_millis(config.pipeline.poll_interval_ms),
        )?;

        let (tx, _rx) = watch::channel(false);
        Ok(Self {
            listener,
            pipeline,
            settings: ConnectionSettings::from_config(config),
            reporter: Arc::new(LogReporter),
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
            shutdown_timeout: Duration::from_secs(defaults::SHUTDOWN_TIMEOUT_SECS),
        })
    }

    /// Sets a custom error reporter for decode errors.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept clients until shutdown. Returns the pipeline's final counters.
    pub async fn run(self) -> Result<PipelineStats> {
        let Server {
            listener,
            pipeline,
            settings,
            reporter,
            shutdown,
            shutdown_timeout,
        } = self;

        tracing::info!(address = %listener.local_addr()?, "listening");

        let mut stop = shutdown.tx.subscribe();
        let (close_tx, close_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let mut next_session = 0u64;

        loop {
            tokio::select! {
                _ = signalled(&mut stop) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_session += 1;
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            SessionId(next_session),
                            pipeline.sender(),
                            settings,
                            reporter.clone(),
                            close_rx.clone(),
                        ));
                    }
                    Err(e) => tracing::warn!("accept failed: {}", e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("connection task failed: {}", e);
                    }
                }
            }
        }

        tracing::info!(open = connections.len(), "shutting down");
        drop(listener);

        let stats = tokio::task::spawn_blocking(move || pipeline.stop(shutdown_timeout))
            .await
            .map_err(|e| SignError::Pipeline {
                message: format!("worker shutdown task failed: {}", e),
            })?
            .unwrap_or_default();

        close_tx.send_replace(true);
        let joined = tokio::time::timeout(shutdown_timeout, async {
            while let Some(joined) = connections.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("connection task failed: {}", e);
                }
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "connections did not close in time, aborting"
            );
            connections.abort_all();
        }

        tracing::info!(
            sessions = next_session,
            frames = stats.frames,
            windows = stats.windows,
            emitted = stats.emitted,
            "server stopped"
        );
        Ok(stats)
    }
}

/// Resolves once `flag` is set, or its sender is gone.
async fn signalled(flag: &mut watch::Receiver<bool>) {
    drop(flag.wait_for(|set| *set).await);
}
