//! Source resolution
//!
//! Turns a [`Source`] reference into a short-lived, directly fetchable media
//! URL. Page references go through the external resolver tool
//! ([`CommandResolver`]); direct manifests are only probed over HTTP
//! ([`ManifestProbe`]). Every attempt ends in a tagged [`ResolveOutcome`] so
//! callers can tell "not live" from "blocked" from "tool broken".
//!
//! Resolvers are stateless: nothing is cached here. Caching is the job of
//! [`SourceRegistry`](crate::registry::SourceRegistry).

pub mod command;
pub mod config;
pub mod outcome;
pub mod probe;

use std::future::Future;

pub use command::CommandResolver;
pub use config::ResolverConfig;
pub use outcome::{classify_failure, classify_output, FailureClass, ResolveFailure, ResolveOutcome};
pub use probe::ManifestProbe;

use crate::registry::{Source, SourceKind};

/// Anything that can resolve a source to a media URL
///
/// The refresh scheduler spawns one task per source, so the returned future
/// must be `Send`.
pub trait Resolve: Send + Sync + 'static {
    fn resolve(&self, source: &Source) -> impl Future<Output = ResolveOutcome> + Send;
}

/// Default resolver: dispatches on [`SourceKind`]
#[derive(Debug, Clone)]
pub struct SourceResolver {
    command: CommandResolver,
    probe: ManifestProbe,
}

impl SourceResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let probe = ManifestProbe::new(reqwest::Client::new(), config.probe_timeout);
        Self {
            command: CommandResolver::new(config),
            probe,
        }
    }

    pub fn with_parts(command: CommandResolver, probe: ManifestProbe) -> Self {
        Self { command, probe }
    }

    pub fn config(&self) -> &ResolverConfig {
        self.command.config()
    }
}

impl Resolve for SourceResolver {
    async fn resolve(&self, source: &Source) -> ResolveOutcome {
        match source.kind {
            SourceKind::ResolvableLive => self.command.resolve_reference(&source.reference).await,
            SourceKind::DirectManifest => self.probe.probe(&source.reference).await,
        }
    }
}
