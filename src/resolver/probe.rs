//! Direct-manifest liveness probe

use std::time::Duration;

use reqwest::{Client, StatusCode};

use super::outcome::ResolveOutcome;

/// Checks that a direct manifest URL is currently served
///
/// A direct manifest needs no resolution; the reference itself is the media
/// URL once the origin answers it with a 2xx.
#[derive(Debug, Clone)]
pub struct ManifestProbe {
    client: Client,
    timeout: Duration,
}

impl ManifestProbe {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn probe(&self, url: &str) -> ResolveOutcome {
        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ResolveOutcome::Timeout,
            Err(e) => return ResolveOutcome::ToolError(e.to_string()),
        };

        classify_status(response.status(), url)
    }
}

fn classify_status(status: StatusCode, url: &str) -> ResolveOutcome {
    match status {
        s if s.is_success() => ResolveOutcome::Success(url.to_string()),
        StatusCode::NOT_FOUND | StatusCode::GONE => ResolveOutcome::NotLive,
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
            ResolveOutcome::Blocked(format!("HTTP {}", status))
        }
        other => ResolveOutcome::ToolError(format!("unexpected status HTTP {}", other)),
    }
}
