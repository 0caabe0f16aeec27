//! Source identity and static description
//!
//! A [`Source`] is created from configuration at startup and never mutated;
//! everything that changes over time lives in the registry's endpoint slot.

use std::borrow::Borrow;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::DEFAULT_REFRESH_INTERVAL;
use super::error::RegistryError;

/// Unique identifier for a source (e.g. "media_one")
///
/// Restricted to `[A-Za-z0-9_-]` so it can be used verbatim as a URL path
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Validate and wrap a source id
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(id))
        } else {
            Err(RegistryError::InvalidSourceId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SourceId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// How a source reference becomes a media URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Channel or live page, resolved through the external tool
    ResolvableLive,
    /// Already a manifest URL; only probed
    DirectManifest,
}

/// A known live source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Registry key
    pub id: SourceId,
    /// Origin URL or page
    pub reference: String,
    /// Resolution strategy
    pub kind: SourceKind,
    /// Time between refresh ticks
    pub resolve_interval: Duration,
}

impl Source {
    /// Create a source with the default refresh interval
    pub fn new(id: SourceId, reference: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id,
            reference: reference.into(),
            kind,
            resolve_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Set the refresh interval
    pub fn resolve_interval(mut self, interval: Duration) -> Self {
        self.resolve_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_validation() {
        assert!(SourceId::new("media_one").is_ok());
        assert!(SourceId::new("entri-degree-2").is_ok());

        assert!(matches!(
            SourceId::new(""),
            Err(RegistryError::InvalidSourceId(_))
        ));
        assert!(SourceId::new("../etc").is_err());
        assert!(SourceId::new("a b").is_err());
    }

    #[test]
    fn test_source_kind_names() {
        let kind: SourceKind = serde_json::from_str("\"direct-manifest\"").unwrap();
        assert_eq!(kind, SourceKind::DirectManifest);
        assert_eq!(
            serde_json::to_string(&SourceKind::ResolvableLive).unwrap(),
            "\"resolvable-live\""
        );
    }

    #[test]
    fn test_source_builder() {
        let id = SourceId::new("media_one").unwrap();
        let source = Source::new(
            id.clone(),
            "https://www.youtube.com/@MediaoneTVLive/live",
            SourceKind::ResolvableLive,
        )
        .resolve_interval(Duration::from_secs(30));

        assert_eq!(source.id, id);
        assert_eq!(source.resolve_interval, Duration::from_secs(30));
        assert_eq!(id.to_string(), "media_one");
    }
}
