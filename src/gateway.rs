//! Gateway facade
//!
//! Wires the registry, scheduler, supervisor, relay and archive together
//! and exposes the few calls the HTTP layer needs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::archive::AudioArchive;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::registry::{RefreshScheduler, SourceId, SourceRegistry, SourceStatus};
use crate::relay::{ProxyRelay, RelayedContent};
use crate::resolver::{CommandResolver, Resolve, SourceResolver};
use crate::session::{SessionStream, SinkFormat, StreamSupervisor};
use crate::stats::{GatewayMetrics, MetricsSnapshot};

/// Output requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Supervised mono MP3
    #[default]
    Audio,
    /// Supervised low resolution MP4
    Video,
    /// Supervised remux to MPEG-TS
    Copy,
    /// Upstream manifest through the proxy relay
    Manifest,
}

impl OutputFormat {
    /// Encoder format, or `None` when the relay serves the request
    pub fn sink(self) -> Option<SinkFormat> {
        match self {
            OutputFormat::Audio => Some(SinkFormat::AudioMp3),
            OutputFormat::Video => Some(SinkFormat::VideoLowRes),
            OutputFormat::Copy => Some(SinkFormat::RawRelay),
            OutputFormat::Manifest => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" | "audio" => Ok(OutputFormat::Audio),
            "video" | "mp4" => Ok(OutputFormat::Video),
            "copy" | "ts" => Ok(OutputFormat::Copy),
            "hls" | "manifest" => Ok(OutputFormat::Manifest),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Audio => "audio",
            OutputFormat::Video => "video",
            OutputFormat::Copy => "copy",
            OutputFormat::Manifest => "manifest",
        };
        f.write_str(name)
    }
}

/// Bytes for one client request
#[derive(Debug)]
pub enum MediaBody {
    /// Chunked encoder output
    Stream(SessionStream),
    /// Single upstream response
    Relayed(RelayedContent),
}

impl MediaBody {
    pub fn content_type(&self) -> &str {
        match self {
            MediaBody::Stream(stream) => stream.content_type(),
            MediaBody::Relayed(content) => &content.content_type,
        }
    }
}

/// The running gateway
pub struct Gateway<R: Resolve = SourceResolver> {
    registry: Arc<SourceRegistry>,
    scheduler: RefreshScheduler<R>,
    supervisor: StreamSupervisor,
    relay: ProxyRelay,
    archive: AudioArchive,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway<SourceResolver> {
    /// Build a gateway with the resolver described by `config`
    pub async fn from_config(config: &GatewayConfig) -> Result<Self> {
        let resolver = SourceResolver::new(config.resolver_config());
        Self::with_resolver(config, resolver).await
    }
}

impl<R: Resolve> Gateway<R> {
    /// Build a gateway around a custom resolver
    ///
    /// Registers every configured source; nothing is resolved until
    /// [`start`](Self::start).
    pub async fn with_resolver(config: &GatewayConfig, resolver: R) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new());
        let registry = Arc::new(SourceRegistry::with_config(config.registry_config()));

        for source in config.sources()? {
            registry.insert(source).await?;
        }

        let scheduler =
            RefreshScheduler::new(Arc::clone(&registry), Arc::new(resolver), Arc::clone(&metrics));
        let supervisor = StreamSupervisor::new(
            Arc::clone(&registry),
            config.supervisor_config(),
            Arc::clone(&metrics),
        );
        let relay = ProxyRelay::new(
            Arc::clone(&registry),
            reqwest::Client::new(),
            config.relay_config(),
            Arc::clone(&metrics),
        );
        let archive = AudioArchive::new(
            CommandResolver::new(config.resolver_config()),
            config.encoder_command(),
            config.archive_config(),
            Arc::clone(&metrics),
        );

        Ok(Self {
            registry,
            scheduler,
            supervisor,
            relay,
            archive,
            metrics,
        })
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &RefreshScheduler<R> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Start refreshing every registered source
    pub async fn start(&self) -> usize {
        self.scheduler.start().await
    }

    /// Stop all refresh tasks
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Liveness of every known source
    pub async fn status(&self) -> Vec<SourceStatus> {
        self.registry.statuses().await
    }

    /// Sources that are live right now
    pub async fn available_now(&self) -> Vec<SourceId> {
        self.registry.live_sources().await
    }

    /// Bytes for `source_id` in `format`
    pub async fn open(&self, source_id: &str, format: OutputFormat) -> Result<MediaBody> {
        match format.sink() {
            Some(sink) => {
                let stream = self.supervisor.open_stream(source_id, sink).await?;
                Ok(MediaBody::Stream(stream))
            }
            None => Ok(MediaBody::Relayed(self.relay.relay(source_id).await?)),
        }
    }

    /// Convert a reference into an archived MP3, returning the file name
    pub async fn convert(&self, reference: &str) -> Result<String> {
        Ok(self.archive.convert(reference).await?)
    }

    /// Archived files, newest first
    pub async fn archived(&self) -> Result<Vec<String>> {
        Ok(self.archive.list().await?)
    }

    /// Path of an archived file, after validating its name
    pub async fn archived_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.archive.open(name).await?)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::registry::{RegistryError, Source};
    use crate::resolver::ResolveOutcome;

    use super::*;

    /// Every source resolves to `<reference>/media.m3u8`
    struct EchoResolver;

    impl Resolve for EchoResolver {
        async fn resolve(&self, source: &Source) -> ResolveOutcome {
            ResolveOutcome::Success(format!("{}/media.m3u8", source.reference))
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::from_toml_str(
            r#"
            [[sources]]
            id = "b"
            reference = "https://b.example"

            [[sources]]
            id = "a"
            reference = "https://a.example"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("mp3".parse::<OutputFormat>().unwrap(), OutputFormat::Audio);
        assert_eq!("audio".parse::<OutputFormat>().unwrap(), OutputFormat::Audio);
        assert_eq!("MP4".parse::<OutputFormat>().unwrap(), OutputFormat::Video);
        assert_eq!("ts".parse::<OutputFormat>().unwrap(), OutputFormat::Copy);
        assert_eq!("copy".parse::<OutputFormat>().unwrap(), OutputFormat::Copy);
        assert_eq!("hls".parse::<OutputFormat>().unwrap(), OutputFormat::Manifest);
        assert_eq!(OutputFormat::default(), OutputFormat::Audio);
        assert!(matches!(
            "flac".parse::<OutputFormat>(),
            Err(Error::UnknownFormat(_))
        ));

        assert_eq!(OutputFormat::Manifest.sink(), None);
        assert_eq!(OutputFormat::Copy.sink(), Some(SinkFormat::RawRelay));
    }

    #[tokio::test]
    async fn test_sources_registered_from_config() {
        let gateway = Gateway::with_resolver(&config(), EchoResolver).await.unwrap();

        let ids: Vec<_> = gateway
            .status()
            .await
            .into_iter()
            .map(|s| s.source_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(gateway.available_now().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_makes_sources_available() {
        let gateway = Gateway::with_resolver(&config(), EchoResolver).await.unwrap();
        assert_eq!(gateway.start().await, 2);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while gateway.available_now().await.len() < 2 {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let endpoint = gateway.registry().snapshot("a").await.unwrap();
        assert_eq!(endpoint.url, "https://a.example/media.m3u8");
        assert_eq!(gateway.metrics_snapshot().resolutions_ok, 2);

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_before_resolution() {
        let gateway = Gateway::with_resolver(&config(), EchoResolver).await.unwrap();

        for format in [OutputFormat::Audio, OutputFormat::Manifest] {
            assert!(matches!(
                gateway.open("a", format).await,
                Err(Error::Session(_)) | Err(Error::Relay(_))
            ));
        }
        assert!(matches!(
            gateway.open("missing", OutputFormat::Manifest).await,
            Err(Error::Relay(crate::relay::RelayError::Registry(
                RegistryError::SourceNotFound(_)
            )))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_config_source_is_fatal() {
        let config = GatewayConfig::from_toml_str(
            r#"
            [[sources]]
            id = "a"
            reference = "https://a.example"
            [[sources]]
            id = "a"
            reference = "https://b.example"
            "#,
        )
        .unwrap();

        assert!(matches!(
            Gateway::with_resolver(&config, EchoResolver).await,
            Err(Error::Config(_))
        ));
    }
}
