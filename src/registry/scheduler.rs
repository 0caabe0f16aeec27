//! Periodic source refresh
//!
//! One tokio task per source. Each task resolves its source, publishes the
//! outcome to the registry, then sleeps for the source's interval (or the
//! longer blocked backoff). Tasks never wait on each other, so a slow or
//! hanging resolver only delays its own source.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::resolver::Resolve;
use crate::stats::GatewayMetrics;

use super::entry::ResolvedEndpoint;
use super::error::RegistryError;
use super::source::{Source, SourceId};
use super::store::SourceRegistry;

/// Owns the refresh task of every source
pub struct RefreshScheduler<R: Resolve> {
    registry: Arc<SourceRegistry>,
    resolver: Arc<R>,
    metrics: Arc<GatewayMetrics>,
    tasks: Mutex<HashMap<SourceId, JoinHandle<()>>>,
}

impl<R: Resolve> RefreshScheduler<R> {
    pub fn new(
        registry: Arc<SourceRegistry>,
        resolver: Arc<R>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            registry,
            resolver,
            metrics,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<R> {
        &self.resolver
    }

    /// Spawn a refresh task for every registered source
    ///
    /// Returns the number of tasks started.
    pub async fn start(&self) -> usize {
        let sources = self.registry.sources().await;
        let count = sources.len();
        for source in sources {
            self.spawn_source(source).await;
        }
        tracing::info!(sources = count, "Refresh scheduler started");
        count
    }

    /// Spawn (or respawn) the refresh task of one source
    pub async fn spawn_source(&self, source: Arc<Source>) {
        let worker = RefreshWorker {
            registry: Arc::clone(&self.registry),
            resolver: Arc::clone(&self.resolver),
            metrics: Arc::clone(&self.metrics),
            source: Arc::clone(&source),
        };

        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.insert(source.id.clone(), tokio::spawn(worker.run())) {
            previous.abort();
        }
    }

    /// Register a source at runtime and start refreshing it
    pub async fn add_source(&self, source: Source) -> Result<Arc<Source>, RegistryError> {
        let source = self.registry.insert(source).await?;
        self.spawn_source(Arc::clone(&source)).await;
        Ok(source)
    }

    /// Stop refreshing a source and drop it from the registry
    pub async fn remove_source(&self, id: &str) -> Option<Arc<Source>> {
        self.stop_source(id).await;
        self.registry.remove(id).await
    }

    /// Stop the refresh task of a source, keeping its cached endpoint
    pub async fn stop_source(&self, id: &str) -> bool {
        match self.tasks.lock().await.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Run one refresh tick for a source outside its schedule
    pub async fn refresh_once(&self, id: &str) -> Result<Arc<ResolvedEndpoint>, RegistryError> {
        let source = self
            .registry
            .source(id)
            .await
            .ok_or_else(|| RegistryError::SourceNotFound(id.to_string()))?;

        refresh(&self.registry, &*self.resolver, &self.metrics, &source).await
    }

    /// Number of refresh tasks still running
    pub async fn task_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Abort every refresh task
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        tracing::info!("Refresh scheduler stopped");
    }
}

struct RefreshWorker<R: Resolve> {
    registry: Arc<SourceRegistry>,
    resolver: Arc<R>,
    metrics: Arc<GatewayMetrics>,
    source: Arc<Source>,
}

impl<R: Resolve> RefreshWorker<R> {
    async fn run(self) {
        loop {
            let endpoint =
                match refresh(&self.registry, &*self.resolver, &self.metrics, &self.source).await {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        tracing::info!(source = %self.source.id, error = %e, "Refresh task stopping");
                        return;
                    }
                };

            tokio::time::sleep(self.next_delay(&endpoint)).await;
        }
    }

    fn next_delay(&self, endpoint: &ResolvedEndpoint) -> Duration {
        match endpoint.last_failure {
            Some(ref failure) if failure.is_blocked() => self
                .registry
                .config()
                .blocked_backoff
                .max(self.source.resolve_interval),
            _ => self.source.resolve_interval,
        }
    }
}

async fn refresh<R: Resolve>(
    registry: &SourceRegistry,
    resolver: &R,
    metrics: &GatewayMetrics,
    source: &Source,
) -> Result<Arc<ResolvedEndpoint>, RegistryError> {
    let started = Instant::now();
    let outcome = resolver.resolve(source).await;
    metrics.record_resolution(&outcome);

    tracing::debug!(
        source = %source.id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        success = outcome.is_success(),
        "Refresh tick"
    );

    registry.record_outcome(source.id.as_str(), outcome).await
}
