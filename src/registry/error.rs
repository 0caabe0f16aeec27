//! Registry error types
//!
//! Error types for source registry operations.

use thiserror::Error;

use super::source::SourceId;

/// Error type for registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Source not found
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Source id already registered
    #[error("Source already registered: {0}")]
    DuplicateSource(SourceId),

    /// Source id is empty or contains characters outside `[A-Za-z0-9_-]`
    #[error("Invalid source id: {0:?}")]
    InvalidSourceId(String),

    /// Source has never been resolved
    #[error("Source not ready: {0}")]
    NotReady(SourceId),

    /// Source has a cached URL but its last refresh failed
    #[error("Source not live: {0}")]
    NotLive(SourceId),
}
