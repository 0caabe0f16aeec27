//! Source registry and refresh scheduling
//!
//! The registry holds every known source together with its most recently
//! resolved endpoint. A [`RefreshScheduler`] task per source keeps the
//! endpoints fresh; everything else only reads snapshots.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SourceRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ sources: HashMap<SourceId,   │
//!                  │   SourceEntry {              │
//!                  │     source,                  │
//!                  │     endpoint: Arc<Endpoint>, │
//!                  │   }                          │
//!                  │ >                            │
//!                  └──────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │ record_outcome()      │ snapshot()            │ statuses()
//!         │                       │                       │
//!   [RefreshWorker]       [StreamSupervisor]        [/resolve-status]
//!   one per source        [ProxyRelay]
//! ```
//!
//! # Replace-on-write
//!
//! An endpoint is never mutated in place. Each refresh builds a new
//! [`ResolvedEndpoint`] from the old one and swaps the `Arc`, so readers
//! always see a whole endpoint. A failed refresh clears `live` but keeps the
//! last good URL.

pub mod config;
pub mod entry;
pub mod error;
pub mod scheduler;
pub mod source;
pub mod store;

pub use config::{RegistryConfig, DEFAULT_REFRESH_INTERVAL};
pub use entry::{ResolvedEndpoint, SourceEntry, SourceStatus, StalePolicy};
pub use error::RegistryError;
pub use scheduler::RefreshScheduler;
pub use source::{Source, SourceId, SourceKind};
pub use store::SourceRegistry;
