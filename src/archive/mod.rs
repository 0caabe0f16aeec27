//! Audio archive
//!
//! Converts a page reference into a cached mono MP3 file. The reference goes
//! through the same resolver tool as live sources; the resolved URL is then
//! encoded to `<dir>/<timestamp>-<slug>.mp3`. Files are written under a
//! `.part` name and renamed once the encoder exits cleanly, so the listing
//! never shows half-written files.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use url::Url;

use crate::resolver::{CommandResolver, ResolveFailure};
use crate::session::{EncoderCommand, EncoderProcess, SinkFormat};
use crate::stats::GatewayMetrics;

const EXTENSION: &str = ".mp3";
const PARTIAL_SUFFIX: &str = ".part";
const MAX_SLUG_LEN: usize = 48;

/// Error type for archive operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid reference: {0:?}")]
    InvalidReference(String),

    #[error("Invalid archive file name: {0:?}")]
    InvalidName(String),

    #[error("Archive file not found: {0}")]
    NotFound(String),

    #[error("Could not resolve {reference}: {failure}")]
    ResolveFailed {
        reference: String,
        failure: ResolveFailure,
    },

    #[error("Encoder failed: {0}")]
    EncoderFailed(String),

    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Archive configuration options
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Directory holding converted files
    pub dir: PathBuf,

    /// Upper bound for one conversion
    pub convert_timeout: Duration,

    /// Time between SIGTERM and SIGKILL when a conversion is aborted
    pub kill_grace: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("archive"),
            convert_timeout: Duration::from_secs(30 * 60),
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl ArchiveConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the conversion timeout
    pub fn convert_timeout(mut self, timeout: Duration) -> Self {
        self.convert_timeout = timeout;
        self
    }
}

/// Cached MP3 conversions
pub struct AudioArchive {
    resolver: CommandResolver,
    encoder: EncoderCommand,
    config: ArchiveConfig,
    metrics: Arc<GatewayMetrics>,
}

impl AudioArchive {
    pub fn new(
        resolver: CommandResolver,
        encoder: EncoderCommand,
        config: ArchiveConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            resolver,
            encoder,
            config,
            metrics,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Resolve and encode `reference`, returning the new file name
    pub async fn convert(&self, reference: &str) -> Result<String, ArchiveError> {
        let reference = reference.trim();
        let parsed = Url::parse(reference)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ArchiveError::InvalidReference(reference.to_string()))?;

        let result = self.convert_url(reference, &parsed).await;
        self.metrics.conversion(result.is_ok());

        match result {
            Ok(ref name) => tracing::info!(reference, file = %name, "Conversion finished"),
            Err(ref e) => tracing::warn!(reference, error = %e, "Conversion failed"),
        }
        result
    }

    async fn convert_url(&self, reference: &str, parsed: &Url) -> Result<String, ArchiveError> {
        let media_url = self
            .resolver
            .resolve_reference(reference)
            .await
            .into_result()
            .map_err(|failure| ArchiveError::ResolveFailed {
                reference: reference.to_string(),
                failure,
            })?;

        tokio::fs::create_dir_all(&self.config.dir).await?;

        let name = format!(
            "{}-{}{}",
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            slug(parsed),
            EXTENSION
        );
        let path = self.config.dir.join(&name);
        let partial = self.config.dir.join(format!("{name}{PARTIAL_SUFFIX}"));

        let args = SinkFormat::AudioMp3.encoder_args_to(&media_url, &partial.to_string_lossy());
        tracing::debug!(reference, file = %name, "Converting");

        let encoded = match self.encode(&args).await {
            Ok(()) => tokio::fs::rename(&partial, &path)
                .await
                .map_err(ArchiveError::from),
            Err(e) => Err(e),
        };

        if encoded.is_err() {
            match tokio::fs::remove_file(&partial).await {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    tracing::warn!(path = %partial.display(), error = %e, "Failed to remove partial file")
                }
                _ => {}
            }
        }

        encoded.map(|()| name)
    }

    async fn encode(&self, args: &[String]) -> Result<(), ArchiveError> {
        let mut process = EncoderProcess::spawn(&self.encoder, args)
            .map_err(|e| ArchiveError::EncoderFailed(format!("spawn failed: {e}")))?;

        let waited = tokio::time::timeout(self.config.convert_timeout, process.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ArchiveError::EncoderFailed(format!("encoder exited with {status}"))),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                process.terminate(self.config.kill_grace).await;
                Err(ArchiveError::Timeout(self.config.convert_timeout))
            }
        }
    }

    /// Converted files, newest first
    pub async fn list(&self) -> Result<Vec<String>, ArchiveError> {
        let mut dir = match tokio::fs::read_dir(&self.config.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(EXTENSION) && entry.file_type().await?.is_file() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Path of a converted file
    pub async fn open(&self, name: &str) -> Result<PathBuf, ArchiveError> {
        validate_name(name)?;

        let path = self.config.dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(ArchiveError::NotFound(name.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ArchiveError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ArchiveError> {
    let valid = name.ends_with(EXTENSION)
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(ArchiveError::InvalidName(name.to_string()))
    }
}

/// File-name friendly summary of a reference URL
fn slug(url: &Url) -> String {
    let source = format!("{}{}", url.host_str().unwrap_or(""), url.path());

    let mut slug = String::with_capacity(MAX_SLUG_LEN);
    let mut dash = false;
    for c in source.chars() {
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "audio".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        let url = Url::parse("https://www.youtube.com/watch?v=abc123").unwrap();
        assert_eq!(slug(&url), "www-youtube-com-watch");

        let url = Url::parse("https://Example.org/Live/Channel_1/").unwrap();
        assert_eq!(slug(&url), "example-org-live-channel-1");

        let long = Url::parse(&format!("https://a.b/{}", "x".repeat(200))).unwrap();
        assert!(slug(&long).len() <= MAX_SLUG_LEN);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("20240101T000000Z-a.mp3").is_ok());

        for bad in ["../secret.mp3", "a/b.mp3", "a\\b.mp3", ".hidden.mp3", "notes.txt", ""] {
            assert!(
                matches!(validate_name(bad), Err(ArchiveError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path().join("missing"), "exit 0", "exit 0");

        assert!(archive.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_open() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "20240101T000000Z-a.mp3",
            "20240301T000000Z-b.mp3",
            "20240201T000000Z-c.mp3",
            "20240401T000000Z-d.mp3.part",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"ID3").unwrap();
        }
        let archive = archive(dir.path().to_path_buf(), "exit 0", "exit 0");

        assert_eq!(
            archive.list().await.unwrap(),
            vec![
                "20240301T000000Z-b.mp3",
                "20240201T000000Z-c.mp3",
                "20240101T000000Z-a.mp3",
            ]
        );

        let path = archive.open("20240101T000000Z-a.mp3").await.unwrap();
        assert_eq!(path, dir.path().join("20240101T000000Z-a.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3");

        assert!(matches!(
            archive.open("20990101T000000Z-z.mp3").await,
            Err(ArchiveError::NotFound(_))
        ));
        assert!(matches!(
            archive.open("../etc/passwd.mp3").await,
            Err(ArchiveError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_reference() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path().to_path_buf(), "exit 0", "exit 0");

        for bad in ["", "not a url", "file:///etc/passwd"] {
            assert!(matches!(
                archive.convert(bad).await,
                Err(ArchiveError::InvalidReference(_))
            ));
        }
    }

    fn archive(dir: PathBuf, resolver_script: &str, encoder_script: &str) -> AudioArchive {
        let resolver = CommandResolver::new(
            crate::resolver::ResolverConfig::default()
                .program("sh")
                .extra_args(["-c", resolver_script, "sh"]),
        );
        let encoder = EncoderCommand::new("sh").pre_args(["-c", encoder_script, "sh"]);
        AudioArchive::new(
            resolver,
            encoder,
            ArchiveConfig::new(dir).convert_timeout(Duration::from_secs(5)),
            Arc::new(GatewayMetrics::new()),
        )
    }

    /// Writes its arguments to the output path (the last argument)
    #[cfg(unix)]
    const WRITE_ARGS: &str = r#"for last; do :; done; printf '%s\n' "$@" > "$last""#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(
            dir.path().join("out"),
            "echo https://cdn.example/audio.m3u8",
            WRITE_ARGS,
        );

        let name = archive
            .convert("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();
        assert!(name.ends_with("-www-youtube-com-watch.mp3"));
        assert_eq!(archive.list().await.unwrap(), vec![name.clone()]);

        let path = archive.open(&name).await.unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        let args: Vec<_> = written.lines().collect();
        let pos = args.iter().position(|a| *a == "-i").unwrap();
        assert_eq!(args[pos + 1], "https://cdn.example/audio.m3u8");
        assert!(written.contains("-vn\n-ac\n1\n-b:a\n40k\n-f\nmp3\n"));

        // Only the final file remains
        let entries = std::fs::read_dir(dir.path().join("out")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_resolve_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(
            dir.path().to_path_buf(),
            "echo 'ERROR: Sign in to confirm you are not a bot' >&2; exit 1",
            WRITE_ARGS,
        );

        let result = archive.convert("https://www.youtube.com/watch?v=abc").await;
        assert!(matches!(
            result,
            Err(ArchiveError::ResolveFailed {
                failure: ResolveFailure::Blocked(_),
                ..
            })
        ));
        assert!(archive.list().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_encoder_failure_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(
            dir.path().to_path_buf(),
            "echo https://cdn.example/audio.m3u8",
            r#"for last; do :; done; printf partial > "$last"; exit 1"#,
        );

        let result = archive.convert("https://www.youtube.com/watch?v=abc").await;
        assert!(matches!(result, Err(ArchiveError::EncoderFailed(_))));

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }
}
