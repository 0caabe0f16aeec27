//! Stream supervisor
//!
//! Opens one encoder-backed session per client request. Each session gets a
//! pump task that copies encoder stdout into a bounded channel, restarts the
//! encoder when it dies mid-stream, and tears the process group down as soon
//! as the client side of the channel is dropped.

use std::future::{self, Future};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tracing::Instrument;

use crate::registry::{SourceId, SourceRegistry, StalePolicy};
use crate::stats::GatewayMetrics;

use super::config::SupervisorConfig;
use super::error::SessionError;
use super::format::SinkFormat;
use super::process::EncoderProcess;
use super::state::{SessionEnd, SessionState};
use super::stream::SessionStream;

/// Starts and supervises encoder sessions
pub struct StreamSupervisor {
    registry: Arc<SourceRegistry>,
    config: Arc<SupervisorConfig>,
    metrics: Arc<GatewayMetrics>,
    session_semaphore: Option<Arc<Semaphore>>,
    next_session_id: AtomicU64,
}

impl StreamSupervisor {
    pub fn new(
        registry: Arc<SourceRegistry>,
        config: SupervisorConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let session_semaphore = if config.max_sessions > 0 {
            Some(Arc::new(Semaphore::new(config.max_sessions)))
        } else {
            None
        };

        Self {
            registry,
            config: Arc::new(config),
            metrics,
            session_semaphore,
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start an encoder for `source_id` and return its output stream
    ///
    /// Fails without spawning anything if the source has no playable URL or
    /// the session limit is reached. Fails after tearing the encoder down if
    /// it produces no output within `ready_timeout`.
    pub async fn open_stream(
        &self,
        source_id: &str,
        format: SinkFormat,
    ) -> Result<SessionStream, SessionError> {
        let endpoint = self.registry.snapshot(source_id).await?;
        let url = endpoint.playable_url(self.config.stale_policy)?;

        let permit = match self.session_semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.metrics.session_rejected();
                    tracing::warn!(
                        source = %endpoint.source_id,
                        limit = self.config.max_sessions,
                        "Session rejected: limit reached"
                    );
                    return Err(SessionError::AtCapacity(self.config.max_sessions));
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!(
            "session",
            session_id,
            source = %endpoint.source_id,
            format = %format
        );

        let started = start_encoder(&self.config, url, format, future::pending())
            .instrument(span.clone())
            .await;
        let (process, first) = match started {
            Ok(Readiness::Ready(process, first)) => (process, first),
            Ok(Readiness::Cancelled) => {
                return Err(SessionError::EncoderDidNotStart("cancelled".to_string()))
            }
            Err(e) => {
                self.metrics.encoder_start_failed();
                span.in_scope(|| tracing::warn!(error = %e, "Session failed to start"));
                return Err(e);
            }
        };

        let mut state = SessionState::new(session_id, endpoint.source_id.clone(), format);
        state.on_ready();
        let (state_tx, state_rx) = watch::channel(state);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        self.metrics.session_opened();
        span.in_scope(|| tracing::info!(pid = ?process.id(), "Session started"));

        let pump = Pump {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            metrics: Arc::clone(&self.metrics),
            source_id: endpoint.source_id.clone(),
            format,
            tx,
            state: state_tx,
            _permit: permit,
        };
        tokio::spawn(pump.run(process, first).instrument(span));

        Ok(SessionStream::new(rx, format.content_type(), state_rx))
    }
}

/// Result of the readiness gate
enum Readiness {
    Ready(EncoderProcess, Bytes),
    /// The client left before the first chunk; the encoder is already torn down
    Cancelled,
}

/// Spawn an encoder and wait for its first chunk
///
/// The wait ends early when `cancelled` resolves.
async fn start_encoder(
    config: &SupervisorConfig,
    url: &str,
    format: SinkFormat,
    cancelled: impl Future<Output = ()>,
) -> Result<Readiness, SessionError> {
    let args = format.encoder_args(url);
    let mut process = EncoderProcess::spawn(&config.encoder, &args)
        .map_err(|e| SessionError::EncoderDidNotStart(format!("spawn failed: {e}")))?;

    let mut buf = BytesMut::with_capacity(config.chunk_size);
    let read = tokio::select! {
        read = tokio::time::timeout(config.ready_timeout, process.read_chunk(&mut buf)) => Some(read),
        _ = cancelled => None,
    };

    let reason = match read {
        None => {
            process.terminate(config.kill_grace).await;
            return Ok(Readiness::Cancelled);
        }
        Some(Ok(Ok(n))) if n > 0 => return Ok(Readiness::Ready(process, buf.freeze())),
        Some(Ok(Ok(_))) => "exited before producing output".to_string(),
        Some(Ok(Err(e))) => format!("failed to read output: {e}"),
        Some(Err(_)) => format!("no output within {:?}", config.ready_timeout),
    };

    process.terminate(config.kill_grace).await;
    Err(SessionError::EncoderDidNotStart(reason))
}

/// How one encoder incarnation ended
enum IncarnationExit {
    Cancelled,
    Eof,
    ReadError(io::Error),
}

/// Per-session task
struct Pump {
    registry: Arc<SourceRegistry>,
    config: Arc<SupervisorConfig>,
    metrics: Arc<GatewayMetrics>,
    source_id: SourceId,
    format: SinkFormat,
    tx: mpsc::Sender<Result<Bytes, SessionError>>,
    state: watch::Sender<SessionState>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Pump {
    async fn run(self, process: EncoderProcess, first: Bytes) {
        let end = self.supervise(process, first).await;

        self.state.send_modify(|s| s.terminate(end));
        self.metrics.session_closed();

        let state = self.state.borrow().clone();
        tracing::info!(
            end = ?end,
            restarts = state.restarts,
            bytes_sent = state.bytes_sent,
            duration_ms = state.duration().as_millis() as u64,
            "Session ended"
        );
    }

    async fn supervise(&self, mut process: EncoderProcess, mut first: Bytes) -> SessionEnd {
        loop {
            let started = Instant::now();
            let exit = self.relay(&mut process, first).await;

            if let IncarnationExit::Cancelled = exit {
                self.state.send_modify(SessionState::drain);
                process.terminate(self.config.kill_grace).await;
                return SessionEnd::ClientDisconnected;
            }

            // Reap before anything else is spawned so incarnations never overlap
            let status = process.terminate(self.config.kill_grace).await;
            match exit {
                IncarnationExit::ReadError(e) => {
                    tracing::warn!(error = %e, "Failed to read encoder output")
                }
                _ => tracing::info!(status = ?status, "Encoder exited mid-stream"),
            }

            let stable = started.elapsed() >= self.config.stable_after;
            let mut failures = self.record_failure(stable);

            (process, first) = loop {
                if failures >= self.config.max_restarts {
                    self.metrics.restart_limit_hit();
                    tracing::warn!(failures, "Restart limit reached");
                    let _ = self
                        .tx
                        .send(Err(SessionError::RestartLimitReached(failures)))
                        .await;
                    return SessionEnd::RestartLimitReached;
                }

                tokio::select! {
                    _ = self.tx.closed() => return SessionEnd::ClientDisconnected,
                    _ = tokio::time::sleep(self.config.restart_backoff) => {}
                }

                match self.restart().await {
                    Ok(Readiness::Ready(process, first)) => break (process, first),
                    Ok(Readiness::Cancelled) => {
                        self.state.send_modify(SessionState::drain);
                        tracing::debug!("Client left while the encoder was restarting");
                        return SessionEnd::ClientDisconnected;
                    }
                    Err(SessionError::Registry(e)) => {
                        tracing::warn!(error = %e, "Source unavailable for restart");
                        let _ = self.tx.send(Err(e.into())).await;
                        return SessionEnd::SourceUnavailable;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Restart failed");
                        failures = self.record_failure(false);
                    }
                }
            };
        }
    }

    fn record_failure(&self, stable: bool) -> u32 {
        let mut failures = 0;
        self.state.send_modify(|s| failures = s.on_incarnation_failed(stable));
        failures
    }

    /// Spawn the next incarnation from a fresh endpoint snapshot
    async fn restart(&self) -> Result<Readiness, SessionError> {
        let endpoint = self.registry.snapshot(self.source_id.as_str()).await?;
        // A viewer that is already watching may keep using a stale URL
        let url = endpoint.playable_url(StalePolicy::ServeStale)?;

        self.state.send_modify(SessionState::on_restart);
        self.metrics.restarted();
        let incarnation = self.state.borrow().incarnation;
        tracing::info!(incarnation, "Restarting encoder");

        let started =
            start_encoder(&self.config, url, self.format, self.tx.closed()).await?;
        if let Readiness::Ready(..) = started {
            self.state.send_modify(SessionState::on_ready);
        }
        Ok(started)
    }

    /// Copy one incarnation's output to the client
    async fn relay(&self, process: &mut EncoderProcess, first: Bytes) -> IncarnationExit {
        if !self.forward(first).await {
            return IncarnationExit::Cancelled;
        }

        let mut buf = BytesMut::with_capacity(self.config.chunk_size);
        loop {
            buf.reserve(self.config.chunk_size);

            let read = tokio::select! {
                _ = self.tx.closed() => return IncarnationExit::Cancelled,
                read = process.read_chunk(&mut buf) => read,
            };

            match read {
                Ok(0) => return IncarnationExit::Eof,
                Ok(_) => {
                    if !self.forward(buf.split().freeze()).await {
                        return IncarnationExit::Cancelled;
                    }
                }
                Err(e) => return IncarnationExit::ReadError(e),
            }
        }
    }

    async fn forward(&self, chunk: Bytes) -> bool {
        let len = chunk.len() as u64;
        if self.tx.send(Ok(chunk)).await.is_err() {
            return false;
        }
        self.metrics.add_bytes_streamed(len);
        self.state.send_modify(|s| s.add_bytes_sent(len));
        true
    }
}
