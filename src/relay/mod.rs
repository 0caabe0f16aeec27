//! Proxy relay
//!
//! Fetch-and-forward of a source's resolved URL for clients that want the
//! upstream manifest as is. One request per call with a short timeout; the
//! relay never retries, the client does.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;

use crate::registry::{RegistryError, SourceRegistry, StalePolicy};
use crate::stats::GatewayMetrics;

/// Content type used when the upstream sends none
pub const DEFAULT_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Error type for relay requests
#[derive(Error, Debug)]
pub enum RelayError {
    /// Source unknown, never resolved, or not live
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Upstream answered with an error status or the transfer failed
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream did not answer in time
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),
}

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Timeout for the whole upstream request, body included
    pub timeout: Duration,

    /// Whether a stale URL may be fetched
    pub stale_policy: StalePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            stale_policy: StalePolicy::LiveOnly,
        }
    }
}

impl RelayConfig {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the stale policy
    pub fn stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }
}

/// Upstream body and its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedContent {
    pub content_type: String,
    pub body: Bytes,
}

/// Forwards upstream bytes for a source
pub struct ProxyRelay {
    registry: Arc<SourceRegistry>,
    client: Client,
    config: RelayConfig,
    metrics: Arc<GatewayMetrics>,
}

impl ProxyRelay {
    pub fn new(
        registry: Arc<SourceRegistry>,
        client: Client,
        config: RelayConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            registry,
            client,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Fetch the current URL of `source_id` once
    pub async fn relay(&self, source_id: &str) -> Result<RelayedContent, RelayError> {
        let endpoint = self.registry.snapshot(source_id).await?;
        let url = endpoint.playable_url(self.config.stale_policy)?;

        let result = self.fetch(url).await;
        self.metrics.relay_request(result.is_ok());

        if let Err(ref e) = result {
            tracing::warn!(source = %endpoint.source_id, error = %e, "Relay request failed");
        }
        result
    }

    async fn fetch(&self, url: &str) -> Result<RelayedContent, RelayError> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Unavailable(format!("upstream returned {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        Ok(RelayedContent { content_type, body })
    }

    fn transport_error(&self, e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::Timeout(self.config.timeout)
        } else {
            RelayError::Unavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    use crate::registry::{Source, SourceId, SourceKind};
    use crate::resolver::ResolveOutcome;

    use super::*;

    async fn spawn_origin() -> String {
        let app = Router::new()
            .route(
                "/live.m3u8",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "application/x-mpegURL")],
                        "#EXTM3U\n#EXT-X-VERSION:3\n",
                    )
                }),
            )
            .route(
                "/bare.m3u8",
                get(|| async { ([(header::CONTENT_TYPE, "")], "#EXTM3U\n").into_response() }),
            )
            .route("/expired.m3u8", get(|| async { StatusCode::FORBIDDEN }))
            .route(
                "/slow.m3u8",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "#EXTM3U\n"
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn relay_for(url: Option<String>, config: RelayConfig) -> (ProxyRelay, Arc<GatewayMetrics>) {
        let registry = Arc::new(SourceRegistry::new());
        registry
            .insert(Source::new(
                SourceId::new("a").unwrap(),
                "https://www.youtube.com/@a/live",
                SourceKind::ResolvableLive,
            ))
            .await
            .unwrap();
        if let Some(url) = url {
            registry
                .record_outcome("a", ResolveOutcome::Success(url))
                .await
                .unwrap();
        }

        let metrics = Arc::new(GatewayMetrics::new());
        let relay = ProxyRelay::new(registry, Client::new(), config, Arc::clone(&metrics));
        (relay, metrics)
    }

    #[tokio::test]
    async fn test_forwards_body_and_content_type() {
        let base = spawn_origin().await;
        let (relay, metrics) =
            relay_for(Some(format!("{base}/live.m3u8")), RelayConfig::default()).await;

        let content = relay.relay("a").await.unwrap();
        assert_eq!(content.content_type, "application/x-mpegURL");
        assert_eq!(&content.body[..], b"#EXTM3U\n#EXT-X-VERSION:3\n");
        assert_eq!(metrics.snapshot().relay_requests, 1);
        assert_eq!(metrics.snapshot().relay_failures, 0);
    }

    #[tokio::test]
    async fn test_missing_content_type_defaults_to_hls() {
        let base = spawn_origin().await;
        let (relay, _) = relay_for(Some(format!("{base}/bare.m3u8")), RelayConfig::default()).await;

        let content = relay.relay("a").await.unwrap();
        assert_eq!(content.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_upstream_failures() {
        let base = spawn_origin().await;

        let (relay, metrics) =
            relay_for(Some(format!("{base}/expired.m3u8")), RelayConfig::default()).await;
        assert!(matches!(
            relay.relay("a").await,
            Err(RelayError::Unavailable(_))
        ));
        assert_eq!(metrics.snapshot().relay_failures, 1);

        let config = RelayConfig::default().timeout(Duration::from_millis(200));
        let (relay, _) = relay_for(Some(format!("{base}/slow.m3u8")), config).await;
        assert!(matches!(relay.relay("a").await, Err(RelayError::Timeout(_))));

        // Nothing listens on port 9 of localhost
        let (relay, _) =
            relay_for(Some("http://127.0.0.1:9/live.m3u8".into()), RelayConfig::default()).await;
        assert!(matches!(
            relay.relay("a").await,
            Err(RelayError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_not_ready_is_not_fetched() {
        let (relay, metrics) = relay_for(None, RelayConfig::default()).await;

        assert!(matches!(
            relay.relay("a").await,
            Err(RelayError::Registry(RegistryError::NotReady(_)))
        ));
        assert!(matches!(
            relay.relay("b").await,
            Err(RelayError::Registry(RegistryError::SourceNotFound(_)))
        ));
        assert_eq!(metrics.snapshot().relay_requests, 0);
    }
}
