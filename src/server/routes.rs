//! HTTP routes
//!
//! | route | response |
//! |---|---|
//! | `GET /resolve-status` | liveness of every source |
//! | `GET /sources` | ids of sources that are live now |
//! | `GET /stream/{id}?format=` | media bytes (`mp3`, `video`, `copy`, `hls`) |
//! | `POST /convert?url=` | archive a reference as MP3 |
//! | `GET /archive` | archived files, newest first |
//! | `GET /archive/{file}` | one archived file |
//! | `GET /metrics` | counters |

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::gateway::{Gateway, MediaBody, OutputFormat};
use crate::registry::{SourceId, SourceStatus};
use crate::resolver::Resolve;
use crate::stats::MetricsSnapshot;

use super::error::ApiError;

type SharedGateway<R> = Arc<Gateway<R>>;

/// Build the router for `gateway`
pub fn router<R: Resolve>(gateway: SharedGateway<R>) -> Router {
    Router::new()
        .route("/resolve-status", get(resolve_status::<R>))
        .route("/sources", get(available_sources::<R>))
        .route("/stream/{source_id}", get(stream::<R>))
        .route("/convert", post(convert::<R>))
        .route("/archive", get(archive_list::<R>))
        .route("/archive/{file}", get(archive_file::<R>))
        .route("/metrics", get(metrics::<R>))
        .with_state(gateway)
}

async fn resolve_status<R: Resolve>(
    State(gateway): State<SharedGateway<R>>,
) -> Json<Vec<SourceStatus>> {
    Json(gateway.status().await)
}

async fn available_sources<R: Resolve>(
    State(gateway): State<SharedGateway<R>>,
) -> Json<Vec<SourceId>> {
    Json(gateway.available_now().await)
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    format: Option<String>,
}

async fn stream<R: Resolve>(
    State(gateway): State<SharedGateway<R>>,
    Path(source_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let format = match params.format.as_deref() {
        Some(format) => format.parse::<OutputFormat>()?,
        None => OutputFormat::default(),
    };

    let media = gateway.open(&source_id, format).await?;
    let content_type = media.content_type().to_string();
    let body = match media {
        MediaBody::Stream(stream) => {
            tracing::debug!(source = %source_id, session_id = stream.id(), %format, "Streaming");
            Body::from_stream(stream)
        }
        MediaBody::Relayed(content) => Body::from(content.body),
    };

    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct ConvertParams {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    file: String,
}

/// Takes `url` from the query string or from a form body
async fn convert<R: Resolve>(
    State(gateway): State<SharedGateway<R>>,
    Query(params): Query<ConvertParams>,
    body: Bytes,
) -> Result<Json<ConvertResponse>, ApiError> {
    let reference = params
        .url
        .or_else(|| {
            url::form_urlencoded::parse(&body)
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default();

    let file = gateway.convert(&reference).await?;
    Ok(Json(ConvertResponse { file }))
}

async fn archive_list<R: Resolve>(
    State(gateway): State<SharedGateway<R>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(gateway.archived().await?))
}

/// Streams the file; honours `Range` so players can seek
async fn archive_file<R: Resolve>(
    State(gateway): State<SharedGateway<R>>,
    Path(file): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let path = gateway.archived_path(&file).await?;

    let mut response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{file}\"")) {
        response.headers_mut().insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn metrics<R: Resolve>(State(gateway): State<SharedGateway<R>>) -> Json<MetricsSnapshot> {
    Json(gateway.metrics_snapshot())
}
