//! Crate-level error type
//!
//! Each component has its own error enum; this type wraps them so the
//! gateway facade and the HTTP layer can propagate any of them with `?`.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::relay::RelayError;
use crate::session::SessionError;

/// Error type for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
