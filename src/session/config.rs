//! Stream supervisor configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::registry::StalePolicy;

/// How to launch the encoder binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    /// Binary name or path
    pub program: PathBuf,

    /// Arguments placed before the format arguments
    pub pre_args: Vec<String>,
}

impl Default for EncoderCommand {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            pre_args: Vec::new(),
        }
    }

    /// Add arguments placed before the format arguments
    pub fn pre_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Supervisor configuration options
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Encoder binary
    pub encoder: EncoderCommand,

    /// How long to wait for the first output chunk
    pub ready_timeout: Duration,

    /// Delay before restarting after an unexpected exit
    pub restart_backoff: Duration,

    /// Consecutive failed incarnations before the session is terminated
    pub max_restarts: u32,

    /// An incarnation that ran at least this long resets the failure count
    pub stable_after: Duration,

    /// Time between SIGTERM and SIGKILL on teardown
    pub kill_grace: Duration,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,

    /// Read size for encoder stdout
    pub chunk_size: usize,

    /// Chunks buffered between the pump task and the client
    pub channel_capacity: usize,

    /// Whether new sessions may start from a stale URL
    pub stale_policy: StalePolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderCommand::default(),
            ready_timeout: Duration::from_secs(6),
            restart_backoff: Duration::from_secs(3),
            max_restarts: 5,
            stable_after: Duration::from_secs(30),
            kill_grace: Duration::from_secs(2),
            max_sessions: 8,
            chunk_size: 16 * 1024, // 16KB
            channel_capacity: 32,
            stale_policy: StalePolicy::LiveOnly,
        }
    }
}

impl SupervisorConfig {
    /// Set the encoder command
    pub fn encoder(mut self, encoder: EncoderCommand) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the readiness timeout
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the restart backoff
    pub fn restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// Set the consecutive failure cap
    pub fn max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = max.max(1);
        self
    }

    /// Set the stable runtime that resets the failure count
    pub fn stable_after(mut self, duration: Duration) -> Self {
        self.stable_after = duration;
        self
    }

    /// Set the kill grace period
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Set maximum concurrent sessions
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the stdout read size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the stale policy
    pub fn stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }
}
