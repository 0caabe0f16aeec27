//! Personal live-media gateway
//!
//! `livegate` keeps a set of live sources (channel pages that must be resolved
//! through an external resolver tool, or direct manifest URLs), refreshes their
//! short-lived media URLs in the background, and serves them to HTTP clients
//! either as a pass-through relay or as a stream produced by a supervised
//! external encoder process.
//!
//! # Architecture
//!
//! ```text
//!   RefreshScheduler ──(one task per source)──► Resolve ──► yt-dlp / HTTP probe
//!          │
//!          ▼ record_outcome (whole-value replace)
//!   ┌──────────────────────────┐
//!   │ SourceRegistry           │
//!   │   id ─► Arc<Endpoint>    │◄──── snapshot ─────┐
//!   └──────────────────────────┘                    │
//!                                       ┌───────────┴───────────┐
//!                                       │                       │
//!                               StreamSupervisor            ProxyRelay
//!                               (ffmpeg, restarts,          (one fetch,
//!                                process-group kill)         no retries)
//!                                       │                       │
//!                                       └────────► axum ◄───────┘
//! ```
//!
//! The [`Gateway`] facade bundles the components and exposes the two narrow
//! interfaces the HTTP layer needs: the liveness listing and
//! [`Gateway::open`].

pub mod archive;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod server;
pub mod session;
pub mod stats;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::{Gateway, MediaBody, OutputFormat};
pub use registry::{
    RefreshScheduler, RegistryConfig, ResolvedEndpoint, Source, SourceId, SourceKind,
    SourceRegistry, StalePolicy,
};
pub use resolver::{Resolve, ResolveFailure, ResolveOutcome, SourceResolver};
pub use server::{GatewayServer, ServerConfig};
pub use session::{SessionStream, SinkFormat, StreamSupervisor, SupervisorConfig};
