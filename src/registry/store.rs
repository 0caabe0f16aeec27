//! Source registry implementation
//!
//! The central registry that owns every known source and its cached
//! endpoint. The refresh scheduler is its only writer; the supervisor, the
//! relay and the status listing read snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::resolver::ResolveOutcome;

use super::config::RegistryConfig;
use super::entry::{ResolvedEndpoint, SourceEntry, SourceStatus, StalePolicy};
use super::error::RegistryError;
use super::source::{Source, SourceId};

/// Central registry for all known sources
///
/// Thread-safe via `RwLock`. Endpoint reads clone an `Arc` and release the
/// lock immediately, so no lock is ever held across resolver or network I/O.
pub struct SourceRegistry {
    /// Map of source id to source entry
    sources: RwLock<HashMap<SourceId, Arc<SourceEntry>>>,

    /// Configuration
    config: RegistryConfig,
}

impl SourceRegistry {
    /// Create a new source registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new source registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a source
    ///
    /// The source starts with a pending endpoint (no URL, not live).
    pub async fn insert(&self, source: Source) -> Result<Arc<Source>, RegistryError> {
        let mut sources = self.sources.write().await;

        if sources.contains_key(&source.id) {
            return Err(RegistryError::DuplicateSource(source.id));
        }

        let id = source.id.clone();
        let entry = Arc::new(SourceEntry::new(source));
        let source = Arc::clone(&entry.source);
        sources.insert(id, entry);

        tracing::info!(
            source = %source.id,
            kind = ?source.kind,
            interval_secs = source.resolve_interval.as_secs(),
            "Source registered"
        );

        Ok(source)
    }

    /// Remove a source and its cached endpoint
    pub async fn remove(&self, id: &str) -> Option<Arc<Source>> {
        let removed = self.sources.write().await.remove(id)?;
        tracing::info!(source = %removed.source.id, "Source removed");
        Some(Arc::clone(&removed.source))
    }

    async fn entry(&self, id: &str) -> Result<Arc<SourceEntry>, RegistryError> {
        self.sources
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::SourceNotFound(id.to_string()))
    }

    /// Get a source description
    pub async fn source(&self, id: &str) -> Option<Arc<Source>> {
        self.sources
            .read()
            .await
            .get(id)
            .map(|entry| Arc::clone(&entry.source))
    }

    /// All sources, ordered by id
    pub async fn sources(&self) -> Vec<Arc<Source>> {
        let mut sources: Vec<_> = self
            .sources
            .read()
            .await
            .values()
            .map(|entry| Arc::clone(&entry.source))
            .collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        sources
    }

    /// Atomic snapshot of a source's endpoint
    pub async fn snapshot(&self, id: &str) -> Result<Arc<ResolvedEndpoint>, RegistryError> {
        let entry = self.entry(id).await?;
        Ok(entry.snapshot().await)
    }

    /// URL a new viewer may use, honouring `policy`
    pub async fn playable_url(&self, id: &str, policy: StalePolicy) -> Result<String, RegistryError> {
        let endpoint = self.snapshot(id).await?;
        endpoint.playable_url(policy).map(str::to_string)
    }

    /// Record a resolution outcome, replacing the endpoint as a whole
    pub async fn record_outcome(
        &self,
        id: &str,
        outcome: ResolveOutcome,
    ) -> Result<Arc<ResolvedEndpoint>, RegistryError> {
        let entry = self.entry(id).await?;
        let endpoint = entry.record(outcome).await;

        match endpoint.last_failure {
            None => tracing::debug!(source = %endpoint.source_id, "Source resolved"),
            Some(ref failure) => tracing::info!(
                source = %endpoint.source_id,
                failure = %failure,
                has_url = endpoint.has_url(),
                "Source refresh failed"
            ),
        }

        Ok(endpoint)
    }

    /// Liveness of every source, ordered by id
    pub async fn statuses(&self) -> Vec<SourceStatus> {
        let entries: Vec<_> = self.sources.read().await.values().cloned().collect();

        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            statuses.push(entry.snapshot().await.status());
        }
        statuses.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        statuses
    }

    /// Ids of sources whose last refresh succeeded
    pub async fn live_sources(&self) -> Vec<SourceId> {
        self.statuses()
            .await
            .into_iter()
            .filter(|status| status.live)
            .map(|status| status.source_id)
            .collect()
    }

    /// Get total number of sources
    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::SourceKind;

    use super::*;

    fn source(id: &str) -> Source {
        Source::new(
            SourceId::new(id).unwrap(),
            format!("https://www.youtube.com/@{id}/live"),
            SourceKind::ResolvableLive,
        )
    }

    #[tokio::test]
    async fn test_insert_and_snapshot() {
        let registry = SourceRegistry::new();
        registry.insert(source("media_one")).await.unwrap();

        let endpoint = registry.snapshot("media_one").await.unwrap();
        assert!(!endpoint.live);
        assert!(!endpoint.has_url());

        // Can't register the same id twice
        let result = registry.insert(source("media_one")).await;
        assert!(matches!(result, Err(RegistryError::DuplicateSource(_))));
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let registry = SourceRegistry::new();

        assert!(matches!(
            registry.snapshot("nope").await,
            Err(RegistryError::SourceNotFound(_))
        ));
        assert!(registry
            .record_outcome("nope", ResolveOutcome::NotLive)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_snapshot_is_not_torn_by_later_writes() {
        let registry = SourceRegistry::new();
        registry.insert(source("a")).await.unwrap();

        registry
            .record_outcome("a", ResolveOutcome::Success("https://x/1".into()))
            .await
            .unwrap();
        let before = registry.snapshot("a").await.unwrap();

        registry
            .record_outcome("a", ResolveOutcome::Timeout)
            .await
            .unwrap();

        // The old snapshot is untouched
        assert!(before.live);
        assert!(before.last_failure.is_none());

        let after = registry.snapshot("a").await.unwrap();
        assert!(!after.live);
        assert_eq!(after.url, "https://x/1");
    }

    #[tokio::test]
    async fn test_live_sources_listing() {
        let registry = SourceRegistry::new();
        registry.insert(source("b")).await.unwrap();
        registry.insert(source("a")).await.unwrap();
        registry.insert(source("c")).await.unwrap();

        registry
            .record_outcome("c", ResolveOutcome::Success("https://x/c".into()))
            .await
            .unwrap();
        registry
            .record_outcome("a", ResolveOutcome::Success("https://x/a".into()))
            .await
            .unwrap();

        let live: Vec<_> = registry
            .live_sources()
            .await
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(live, vec!["a", "c"]);

        let statuses = registry.statuses().await;
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[1].source_id.as_str(), "b");
        assert!(!statuses[1].live);
    }

    #[tokio::test]
    async fn test_playable_url_and_remove() {
        let registry = SourceRegistry::new();
        registry.insert(source("a")).await.unwrap();

        assert!(matches!(
            registry.playable_url("a", StalePolicy::LiveOnly).await,
            Err(RegistryError::NotReady(_))
        ));

        registry
            .record_outcome("a", ResolveOutcome::Success("https://x/a".into()))
            .await
            .unwrap();
        assert_eq!(
            registry.playable_url("a", StalePolicy::LiveOnly).await.unwrap(),
            "https://x/a"
        );

        assert!(registry.remove("a").await.is_some());
        assert_eq!(registry.source_count().await, 0);
        assert!(registry.remove("a").await.is_none());
    }
}
