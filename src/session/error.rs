//! Session error types

use thiserror::Error;

use crate::registry::RegistryError;

/// Error type for stream sessions
#[derive(Error, Debug)]
pub enum SessionError {
    /// Source unknown, never resolved, or not live
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Encoder failed to spawn, exited before output, or stayed silent
    #[error("Encoder did not start: {0}")]
    EncoderDidNotStart(String),

    /// Session limit reached
    #[error("Too many active sessions (limit {0})")]
    AtCapacity(usize),

    /// Encoder kept failing mid-stream
    #[error("Encoder failed {0} times in a row, giving up")]
    RestartLimitReached(u32),
}
