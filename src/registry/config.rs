//! Registry and refresh configuration

use std::time::Duration;

use super::source::SourceKind;

/// Refresh interval used when nothing else is configured
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Refresh interval for resolvable live sources
    pub live_interval: Duration,

    /// Refresh interval for direct manifests
    pub manifest_interval: Duration,

    /// Delay before the next tick after a `Blocked` outcome
    pub blocked_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            live_interval: DEFAULT_REFRESH_INTERVAL,
            manifest_interval: DEFAULT_REFRESH_INTERVAL,
            blocked_backoff: Duration::from_secs(300),
        }
    }
}

impl RegistryConfig {
    /// Set the live-page refresh interval
    pub fn live_interval(mut self, interval: Duration) -> Self {
        self.live_interval = interval;
        self
    }

    /// Set the direct-manifest refresh interval
    pub fn manifest_interval(mut self, interval: Duration) -> Self {
        self.manifest_interval = interval;
        self
    }

    /// Set the blocked backoff
    pub fn blocked_backoff(mut self, backoff: Duration) -> Self {
        self.blocked_backoff = backoff;
        self
    }

    /// Default interval for a source kind
    pub fn interval_for(&self, kind: SourceKind) -> Duration {
        match kind {
            SourceKind::ResolvableLive => self.live_interval,
            SourceKind::DirectManifest => self.manifest_interval,
        }
    }
}
