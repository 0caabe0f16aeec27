//! Configuration file
//!
//! The gateway is configured from a single TOML file. Every section is
//! optional and falls back to the defaults of the matching runtime config
//! struct; only `[[sources]]` has to be filled in to be useful.
//!
//! ```toml
//! stale_policy = "live-only"
//!
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [resolver]
//! program = "yt-dlp"
//! cookies = "/mnt/data/cookies.txt"
//! format = "91"
//!
//! [encoder]
//! program = "ffmpeg"
//! max_sessions = 8
//!
//! [[sources]]
//! id = "media_one"
//! reference = "https://www.youtube.com/@MediaoneTVLive/live"
//!
//! [[sources]]
//! id = "news_hls"
//! reference = "https://cdn.example/news/master.m3u8"
//! kind = "direct-manifest"
//! interval_secs = 30
//! ```

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::archive::ArchiveConfig;
use crate::registry::{RegistryConfig, RegistryError, Source, SourceId, SourceKind, StalePolicy};
use crate::relay::RelayConfig;
use crate::resolver::ResolverConfig;
use crate::server::ServerConfig;
use crate::session::{EncoderCommand, SupervisorConfig};

/// Error type for configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{tool} binary not found: {}", program.display())]
    MissingTool {
        tool: &'static str,
        program: PathBuf,
        #[source]
        source: which::Error,
    },

    #[error("Invalid source {id:?}: {reason}")]
    InvalidSource { id: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Whether new viewers may get a URL whose last refresh failed
    pub stale_policy: StalePolicy,
    pub server: ServerSection,
    pub resolver: ResolverSection,
    pub encoder: EncoderSection,
    pub refresh: RefreshSection,
    pub relay: RelaySection,
    pub archive: ArchiveSection,
    pub sources: Vec<SourceSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: SocketAddr,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind: defaults.bind_addr,
            shutdown_grace_secs: defaults.shutdown_grace.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSection {
    pub program: PathBuf,
    pub cookies: Option<PathBuf>,
    pub format: String,
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ResolverSection {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            program: defaults.program,
            cookies: defaults.cookies,
            format: defaults.format,
            extra_args: defaults.extra_args,
            timeout_secs: defaults.timeout.as_secs(),
            probe_timeout_secs: defaults.probe_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderSection {
    pub program: PathBuf,
    /// Placed before the input flags, e.g. `["-nostdin"]`
    pub extra_args: Vec<String>,
    pub ready_timeout_secs: u64,
    pub restart_backoff_secs: u64,
    pub max_restarts: u32,
    pub stable_after_secs: u64,
    pub kill_grace_secs: u64,
    pub max_sessions: usize,
}

impl Default for EncoderSection {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            program: defaults.encoder.program,
            extra_args: defaults.encoder.pre_args,
            ready_timeout_secs: defaults.ready_timeout.as_secs(),
            restart_backoff_secs: defaults.restart_backoff.as_secs(),
            max_restarts: defaults.max_restarts,
            stable_after_secs: defaults.stable_after.as_secs(),
            kill_grace_secs: defaults.kill_grace.as_secs(),
            max_sessions: defaults.max_sessions,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshSection {
    pub live_interval_secs: u64,
    pub manifest_interval_secs: u64,
    pub blocked_backoff_secs: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        let defaults = RegistryConfig::default();
        Self {
            live_interval_secs: defaults.live_interval.as_secs(),
            manifest_interval_secs: defaults.manifest_interval.as_secs(),
            blocked_backoff_secs: defaults.blocked_backoff.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub timeout_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            timeout_secs: RelayConfig::default().timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSection {
    pub dir: PathBuf,
    pub convert_timeout_secs: u64,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        let defaults = ArchiveConfig::default();
        Self {
            dir: defaults.dir,
            convert_timeout_secs: defaults.convert_timeout.as_secs(),
        }
    }
}

/// One `[[sources]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    pub id: String,
    pub reference: String,
    #[serde(default = "default_kind")]
    pub kind: SourceKind,
    pub interval_secs: Option<u64>,
}

fn default_kind() -> SourceKind {
    SourceKind::ResolvableLive
}

impl GatewayConfig {
    /// Read and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config text
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        toml::from_str(data).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Check everything that has to hold before the gateway starts
    ///
    /// Replaces tool names with the paths found on `PATH` and drops a cookie
    /// file that does not exist (with a warning).
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.resolver.program = locate("resolver", &self.resolver.program)?;
        self.encoder.program = locate("encoder", &self.encoder.program)?;

        if let Some(ref cookies) = self.resolver.cookies {
            if !cookies.is_file() {
                tracing::warn!(
                    path = %cookies.display(),
                    "Cookie file not found, resolving without cookies"
                );
                self.resolver.cookies = None;
            }
        }

        self.sources()?;
        Ok(self)
    }

    /// Sources described by the file, in file order
    pub fn sources(&self) -> Result<Vec<Source>, ConfigError> {
        let registry = self.registry_config();
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(self.sources.len());

        for section in &self.sources {
            let id = SourceId::new(section.id.as_str())?;
            if !seen.insert(id.clone()) {
                return Err(RegistryError::DuplicateSource(id).into());
            }

            let reference = section.reference.trim();
            if reference.is_empty() {
                return Err(ConfigError::InvalidSource {
                    id: section.id.clone(),
                    reason: "empty reference".to_string(),
                });
            }
            if section.kind == SourceKind::DirectManifest {
                let valid = Url::parse(reference)
                    .map(|url| matches!(url.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !valid {
                    return Err(ConfigError::InvalidSource {
                        id: section.id.clone(),
                        reason: "direct manifest must be an http(s) URL".to_string(),
                    });
                }
            }

            let interval = section
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| registry.interval_for(section.kind));

            sources.push(Source::new(id, reference, section.kind).resolve_interval(interval));
        }

        Ok(sources)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::with_addr(self.server.bind)
            .shutdown_grace(Duration::from_secs(self.server.shutdown_grace_secs))
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        let section = &self.resolver;
        let mut config = ResolverConfig::default()
            .program(&section.program)
            .format(section.format.as_str())
            .extra_args(section.extra_args.iter().cloned())
            .timeout(Duration::from_secs(section.timeout_secs))
            .probe_timeout(Duration::from_secs(section.probe_timeout_secs));
        if let Some(ref cookies) = section.cookies {
            config = config.cookies(cookies);
        }
        config
    }

    pub fn encoder_command(&self) -> EncoderCommand {
        EncoderCommand::new(&self.encoder.program)
            .pre_args(self.encoder.extra_args.iter().cloned())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let section = &self.encoder;
        SupervisorConfig::default()
            .encoder(self.encoder_command())
            .ready_timeout(Duration::from_secs(section.ready_timeout_secs))
            .restart_backoff(Duration::from_secs(section.restart_backoff_secs))
            .max_restarts(section.max_restarts)
            .stable_after(Duration::from_secs(section.stable_after_secs))
            .kill_grace(Duration::from_secs(section.kill_grace_secs))
            .max_sessions(section.max_sessions)
            .stale_policy(self.stale_policy)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        let section = &self.refresh;
        RegistryConfig::default()
            .live_interval(Duration::from_secs(section.live_interval_secs))
            .manifest_interval(Duration::from_secs(section.manifest_interval_secs))
            .blocked_backoff(Duration::from_secs(section.blocked_backoff_secs))
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .timeout(Duration::from_secs(self.relay.timeout_secs))
            .stale_policy(self.stale_policy)
    }

    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig::new(&self.archive.dir)
            .convert_timeout(Duration::from_secs(self.archive.convert_timeout_secs))
    }
}

fn locate(tool: &'static str, program: &Path) -> Result<PathBuf, ConfigError> {
    which::which(program).map_err(|source| ConfigError::MissingTool {
        tool,
        program: program.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
        stale_policy = "serve-stale"

        [server]
        bind = "127.0.0.1:8100"

        [resolver]
        cookies = "/definitely/missing/cookies.txt"
        format = "91"

        [encoder]
        max_sessions = 3

        [refresh]
        live_interval_secs = 45

        [[sources]]
        id = "media_one"
        reference = "https://www.youtube.com/@MediaoneTVLive/live"

        [[sources]]
        id = "news_hls"
        reference = "https://cdn.example/news/master.m3u8"
        kind = "direct-manifest"
        interval_secs = 15
    "#;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GatewayConfig::from_toml_str("").unwrap();

        assert_eq!(config.stale_policy, StalePolicy::LiveOnly);
        assert_eq!(config.server_config().bind_addr.port(), 8000);
        assert_eq!(config.resolver_config().program, PathBuf::from("yt-dlp"));
        assert_eq!(config.resolver_config().timeout, Duration::from_secs(25));
        assert_eq!(config.supervisor_config().max_sessions, 8);
        assert_eq!(config.supervisor_config().max_restarts, 5);
        assert_eq!(config.relay_config().timeout, Duration::from_secs(10));
        assert_eq!(
            config.archive_config().convert_timeout,
            Duration::from_secs(30 * 60)
        );
        assert!(config.sources().unwrap().is_empty());
    }

    #[test]
    fn test_sample_config() {
        let config = GatewayConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.stale_policy, StalePolicy::ServeStale);
        assert_eq!(
            config.server_config().bind_addr,
            "127.0.0.1:8100".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.resolver_config().format, "91");
        assert_eq!(config.supervisor_config().max_sessions, 3);
        assert_eq!(config.supervisor_config().stale_policy, StalePolicy::ServeStale);
        assert_eq!(config.relay_config().stale_policy, StalePolicy::ServeStale);

        let sources = config.sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id.as_str(), "media_one");
        assert_eq!(sources[0].kind, SourceKind::ResolvableLive);
        assert_eq!(sources[0].resolve_interval, Duration::from_secs(45));
        assert_eq!(sources[1].kind, SourceKind::DirectManifest);
        assert_eq!(sources[1].resolve_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = GatewayConfig::from_toml_str("[encoder]\nmax_session = 3\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_sources() {
        let duplicate = r#"
            [[sources]]
            id = "a"
            reference = "https://x/live"
            [[sources]]
            id = "a"
            reference = "https://y/live"
        "#;
        let config = GatewayConfig::from_toml_str(duplicate).unwrap();
        assert!(matches!(
            config.sources(),
            Err(ConfigError::Registry(RegistryError::DuplicateSource(_)))
        ));

        let bad_id = "[[sources]]\nid = \"a b\"\nreference = \"https://x/live\"\n";
        let config = GatewayConfig::from_toml_str(bad_id).unwrap();
        assert!(matches!(
            config.sources(),
            Err(ConfigError::Registry(RegistryError::InvalidSourceId(_)))
        ));

        let bad_manifest =
            "[[sources]]\nid = \"a\"\nreference = \"not a url\"\nkind = \"direct-manifest\"\n";
        let config = GatewayConfig::from_toml_str(bad_manifest).unwrap();
        assert!(matches!(
            config.sources(),
            Err(ConfigError::InvalidSource { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_locates_tools_and_drops_missing_cookies() {
        let mut config = GatewayConfig::from_toml_str(SAMPLE).unwrap();
        config.resolver.program = PathBuf::from("sh");
        config.encoder.program = PathBuf::from("sh");

        let config = config.validate().unwrap();
        assert!(config.resolver.program.is_absolute());
        assert!(config.encoder.program.is_absolute());
        assert!(config.resolver.cookies.is_none());
        assert!(config.resolver_config().cookies.is_none());
    }

    #[test]
    fn test_validate_missing_tool() {
        let mut config = GatewayConfig::default();
        config.encoder.program = PathBuf::from("livegate-no-such-encoder");
        config.resolver.program = PathBuf::from("livegate-no-such-resolver");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingTool { tool: "resolver", .. })
        ));
    }

    #[test]
    fn test_example_file_parses() {
        let config =
            GatewayConfig::from_toml_str(include_str!("../livegate.example.toml")).unwrap();
        let defaults = GatewayConfig::default();

        assert_eq!(config.server_config().bind_addr, defaults.server_config().bind_addr);
        assert_eq!(
            config.supervisor_config().ready_timeout,
            defaults.supervisor_config().ready_timeout
        );
        assert_eq!(
            config.registry_config().blocked_backoff,
            defaults.registry_config().blocked_backoff
        );
        assert_eq!(config.sources().unwrap().len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.sources.len(), 2);

        assert!(matches!(
            GatewayConfig::load("/definitely/missing/livegate.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
