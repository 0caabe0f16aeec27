//! Per-source cache slot
//!
//! Each registered source owns exactly one [`ResolvedEndpoint`] at a time,
//! held behind an `Arc` and swapped as a whole on every refresh, so a reader
//! either sees the previous endpoint or the next one, never a mix.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::resolver::{ResolveFailure, ResolveOutcome};

use super::error::RegistryError;
use super::source::{Source, SourceId};

/// Whether a cached URL may be handed to a new viewer while `live == false`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// New viewers only get sources whose last resolution succeeded
    #[default]
    LiveOnly,
    /// New viewers get the last good URL even after a failed refresh
    ServeStale,
}

/// Most recent resolution state for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub source_id: SourceId,
    /// Last good media URL; empty until the first success
    pub url: String,
    /// When `url` was obtained
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the last attempt (successful or not) finished
    pub checked_at: Option<DateTime<Utc>>,
    /// Outcome of the most recent attempt
    pub live: bool,
    /// Failure of the most recent attempt, if it failed
    pub last_failure: Option<ResolveFailure>,
}

impl ResolvedEndpoint {
    /// Endpoint of a source that was never resolved
    pub fn pending(source_id: SourceId) -> Self {
        Self {
            source_id,
            url: String::new(),
            resolved_at: None,
            checked_at: None,
            live: false,
            last_failure: None,
        }
    }

    /// Whether a URL has ever been resolved
    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }

    /// Next endpoint after `outcome`
    ///
    /// Failures keep the last good URL and only clear `live`. A "success"
    /// without a URL is treated as a tool failure so it can never blank a
    /// cached URL.
    pub fn apply(&self, outcome: ResolveOutcome, now: DateTime<Utc>) -> Self {
        match outcome.into_result() {
            Ok(url) if !url.trim().is_empty() => Self {
                source_id: self.source_id.clone(),
                url,
                resolved_at: Some(now),
                checked_at: Some(now),
                live: true,
                last_failure: None,
            },
            Ok(_) => self.failed(
                ResolveFailure::ToolError("resolver returned an empty url".to_string()),
                now,
            ),
            Err(failure) => self.failed(failure, now),
        }
    }

    fn failed(&self, failure: ResolveFailure, now: DateTime<Utc>) -> Self {
        Self {
            source_id: self.source_id.clone(),
            url: self.url.clone(),
            resolved_at: self.resolved_at,
            checked_at: Some(now),
            live: false,
            last_failure: Some(failure),
        }
    }

    /// URL to hand to a new viewer under `policy`
    pub fn playable_url(&self, policy: StalePolicy) -> Result<&str, RegistryError> {
        if !self.has_url() {
            return Err(RegistryError::NotReady(self.source_id.clone()));
        }
        if !self.live && policy == StalePolicy::LiveOnly {
            return Err(RegistryError::NotLive(self.source_id.clone()));
        }
        Ok(&self.url)
    }

    /// Public view without the URL
    pub fn status(&self) -> SourceStatus {
        SourceStatus {
            source_id: self.source_id.clone(),
            live: self.live,
            resolved_at: self.resolved_at,
            checked_at: self.checked_at,
            last_failure: self.last_failure.clone(),
        }
    }
}

/// Liveness listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub source_id: SourceId,
    pub live: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub checked_at: Option<DateTime<Utc>>,
    pub last_failure: Option<ResolveFailure>,
}

/// Entry for a single source in the registry
pub struct SourceEntry {
    /// Static description
    pub source: Arc<Source>,

    /// Current endpoint, replaced whole on each refresh
    pub(super) endpoint: RwLock<Arc<ResolvedEndpoint>>,
}

impl SourceEntry {
    pub(super) fn new(source: Source) -> Self {
        let endpoint = ResolvedEndpoint::pending(source.id.clone());
        Self {
            source: Arc::new(source),
            endpoint: RwLock::new(Arc::new(endpoint)),
        }
    }

    /// Clone the current endpoint out of the slot
    pub async fn snapshot(&self) -> Arc<ResolvedEndpoint> {
        Arc::clone(&*self.endpoint.read().await)
    }

    /// Apply an outcome and publish the resulting endpoint
    pub(super) async fn record(&self, outcome: ResolveOutcome) -> Arc<ResolvedEndpoint> {
        let mut slot = self.endpoint.write().await;
        let next = Arc::new(slot.apply(outcome, Utc::now()));
        *slot = Arc::clone(&next);
        next
    }
}
