//! Resolver configuration

use std::path::PathBuf;
use std::time::Duration;

/// Resolver tool and manifest probe options
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Resolver binary (yt-dlp contract)
    pub program: PathBuf,

    /// Cookie file passed with `--cookies`, if present
    pub cookies: Option<PathBuf>,

    /// Format selector passed with `-f`
    pub format: String,

    /// Extra arguments placed before the standard flags
    pub extra_args: Vec<String>,

    /// Hard deadline for one resolver run
    pub timeout: Duration,

    /// Deadline for probing a direct manifest
    pub probe_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            cookies: None,
            format: "best".to_string(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(25),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl ResolverConfig {
    /// Set the resolver binary
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the cookie file
    pub fn cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies = Some(path.into());
        self
    }

    /// Set the format selector
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Set extra leading arguments
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the resolver deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the manifest probe deadline
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}
