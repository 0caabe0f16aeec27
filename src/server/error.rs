//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::archive::ArchiveError;
use crate::error::Error;
use crate::registry::RegistryError;
use crate::relay::RelayError;
use crate::session::SessionError;

/// Error returned by a handler
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            Error::Registry(ref e) => registry_status(e),
            Error::Session(ref e) => match e {
                SessionError::Registry(e) => registry_status(e),
                SessionError::EncoderDidNotStart(_)
                | SessionError::AtCapacity(_)
                | SessionError::RestartLimitReached(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Error::Relay(ref e) => match e {
                RelayError::Registry(e) => registry_status(e),
                RelayError::Unavailable(_) => StatusCode::BAD_GATEWAY,
                RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            },
            Error::Archive(ref e) => match e {
                ArchiveError::InvalidReference(_) | ArchiveError::InvalidName(_) => {
                    StatusCode::BAD_REQUEST
                }
                ArchiveError::NotFound(_) => StatusCode::NOT_FOUND,
                ArchiveError::ResolveFailed { .. }
                | ArchiveError::EncoderFailed(_)
                | ArchiveError::Timeout(_) => StatusCode::BAD_GATEWAY,
                ArchiveError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::UnknownFormat(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn registry_status(e: &RegistryError) -> StatusCode {
    match e {
        RegistryError::SourceNotFound(_) | RegistryError::InvalidSourceId(_) => {
            StatusCode::NOT_FOUND
        }
        RegistryError::NotReady(_) | RegistryError::NotLive(_) => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::DuplicateSource(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
