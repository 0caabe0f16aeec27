//! Gateway-wide counters
//!
//! Plain atomics; every component gets an `Arc<GatewayMetrics>` and bumps the
//! counters it owns. [`GatewayMetrics::snapshot`] produces a serializable
//! copy for the `/metrics` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::resolver::ResolveOutcome;

/// Live counters
#[derive(Debug)]
pub struct GatewayMetrics {
    started_at: Instant,

    resolutions_ok: AtomicU64,
    resolutions_failed: AtomicU64,
    resolutions_blocked: AtomicU64,

    sessions_opened: AtomicU64,
    sessions_rejected: AtomicU64,
    sessions_active: AtomicU64,
    encoder_start_failures: AtomicU64,
    restarts: AtomicU64,
    restart_limit_hits: AtomicU64,
    bytes_streamed: AtomicU64,

    relay_requests: AtomicU64,
    relay_failures: AtomicU64,

    conversions: AtomicU64,
    conversion_failures: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            resolutions_ok: AtomicU64::new(0),
            resolutions_failed: AtomicU64::new(0),
            resolutions_blocked: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            encoder_start_failures: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            restart_limit_hits: AtomicU64::new(0),
            bytes_streamed: AtomicU64::new(0),
            relay_requests: AtomicU64::new(0),
            relay_failures: AtomicU64::new(0),
            conversions: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
        }
    }

    /// Count one resolver run
    pub fn record_resolution(&self, outcome: &ResolveOutcome) {
        match outcome {
            ResolveOutcome::Success(_) => self.resolutions_ok.fetch_add(1, Ordering::Relaxed),
            ResolveOutcome::Blocked(_) => {
                self.resolutions_failed.fetch_add(1, Ordering::Relaxed);
                self.resolutions_blocked.fetch_add(1, Ordering::Relaxed)
            }
            _ => self.resolutions_failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Saturate instead of wrapping if a close is ever double counted
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encoder_start_failed(&self) {
        self.encoder_start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn restarted(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn restart_limit_hit(&self) {
        self.restart_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_streamed(&self, bytes: u64) {
        self.bytes_streamed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn relay_request(&self, ok: bool) {
        self.relay_requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.relay_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn conversion(&self, ok: bool) {
        if ok {
            self.conversions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.conversion_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current number of open stream sessions
    pub fn active_sessions(&self) -> u64 {
        self.sessions_active.load(Ordering::Relaxed)
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            resolutions_ok: self.resolutions_ok.load(Ordering::Relaxed),
            resolutions_failed: self.resolutions_failed.load(Ordering::Relaxed),
            resolutions_blocked: self.resolutions_blocked.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            encoder_start_failures: self.encoder_start_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            restart_limit_hits: self.restart_limit_hits.load(Ordering::Relaxed),
            bytes_streamed: self.bytes_streamed.load(Ordering::Relaxed),
            relay_requests: self.relay_requests.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`GatewayMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub resolutions_ok: u64,
    pub resolutions_failed: u64,
    pub resolutions_blocked: u64,
    pub sessions_opened: u64,
    pub sessions_rejected: u64,
    pub sessions_active: u64,
    pub encoder_start_failures: u64,
    pub restarts: u64,
    pub restart_limit_hits: u64,
    pub bytes_streamed: u64,
    pub relay_requests: u64,
    pub relay_failures: u64,
    pub conversions: u64,
    pub conversion_failures: u64,
}
