//! Session state machine
//!
//! Tracks a stream session from the first encoder spawn to teardown. The pump
//! task owns the state and publishes every change through a `watch` channel.

use std::time::{Duration, Instant};

use crate::registry::SourceId;

use super::format::SinkFormat;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Encoder spawned (or respawning), waiting for output
    Starting,
    /// Output is flowing to the client
    Streaming,
    /// Client went away, tearing the encoder down
    Draining,
    /// Session finished
    Terminated,
}

/// Why a session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client disconnected or dropped the stream
    ClientDisconnected,
    /// Too many consecutive encoder failures
    RestartLimitReached,
    /// Source disappeared from the registry during a restart
    SourceUnavailable,
}

/// Complete session state
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Source being streamed
    pub source_id: SourceId,

    /// Output format
    pub format: SinkFormat,

    /// Current phase
    pub phase: SessionPhase,

    /// Encoder spawn attempts so far, starting at 1
    pub incarnation: u32,

    /// Failed incarnations since the last stable one
    pub consecutive_failures: u32,

    /// Restarts attempted
    pub restarts: u32,

    /// Bytes delivered to the client
    pub bytes_sent: u64,

    /// Session start time
    pub started_at: Instant,

    /// Set once the session is terminated
    pub end: Option<SessionEnd>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, source_id: SourceId, format: SinkFormat) -> Self {
        Self {
            id,
            source_id,
            format,
            phase: SessionPhase::Starting,
            incarnation: 1,
            consecutive_failures: 0,
            restarts: 0,
            bytes_sent: 0,
            started_at: Instant::now(),
            end: None,
        }
    }

    /// First chunk of the current incarnation arrived
    pub fn on_ready(&mut self) {
        if self.phase == SessionPhase::Starting {
            self.phase = SessionPhase::Streaming;
        }
    }

    /// The current incarnation ended unexpectedly
    ///
    /// `stable` incarnations reset the counter before counting themselves.
    /// Returns the new consecutive failure count.
    pub fn on_incarnation_failed(&mut self, stable: bool) -> u32 {
        if stable {
            self.consecutive_failures = 0;
        }
        self.consecutive_failures += 1;
        if self.phase != SessionPhase::Terminated {
            self.phase = SessionPhase::Starting;
        }
        self.consecutive_failures
    }

    /// A new incarnation is about to be spawned
    pub fn on_restart(&mut self) {
        self.incarnation += 1;
        self.restarts += 1;
        self.phase = SessionPhase::Starting;
    }

    /// Account bytes delivered to the client
    pub fn add_bytes_sent(&mut self, bytes: u64) {
        self.bytes_sent += bytes;
    }

    /// Start tearing the session down
    pub fn drain(&mut self) {
        if self.phase != SessionPhase::Terminated {
            self.phase = SessionPhase::Draining;
        }
    }

    /// Mark the session finished
    pub fn terminate(&mut self, end: SessionEnd) {
        self.phase = SessionPhase::Terminated;
        self.end = Some(end);
    }

    /// Check if session is terminated
    pub fn is_terminated(&self) -> bool {
        self.phase == SessionPhase::Terminated
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}
