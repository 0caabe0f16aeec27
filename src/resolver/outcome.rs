//! Resolution outcomes and failure classification

use serde::Serialize;
use thiserror::Error;

/// Stderr fragments meaning "reachable, but not streaming right now".
const NOT_LIVE_MARKERS: &[&str] = &[
    "is not currently live",
    "this live event will begin",
    "premieres in",
    "not live",
    "live stream recording is not available",
    "has ended",
];

/// Stderr fragments meaning the origin refused us.
const BLOCKED_MARKERS: &[&str] = &[
    "sign in to confirm",
    "http error 403",
    "http error 429",
    "private video",
    "members-only",
    "available to this channel's members",
    "not available in your country",
    "geo restricted",
    "blocked",
];

/// Result of one resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Directly fetchable media URL
    Success(String),
    /// Source reachable but not currently streaming
    NotLive,
    /// Origin refused access; callers should back off longer
    Blocked(String),
    /// The resolver did not finish within its deadline
    Timeout,
    /// The tool failed for any other reason
    ToolError(String),
}

impl ResolveOutcome {
    /// Whether this outcome carries a URL
    pub fn is_success(&self) -> bool {
        matches!(self, ResolveOutcome::Success(_))
    }

    /// The resolved URL, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            ResolveOutcome::Success(url) => Some(url),
            _ => None,
        }
    }

    /// Split into the URL or the classified failure
    pub fn into_result(self) -> Result<String, ResolveFailure> {
        match self {
            ResolveOutcome::Success(url) => Ok(url),
            ResolveOutcome::NotLive => Err(ResolveFailure::NotLive),
            ResolveOutcome::Blocked(reason) => Err(ResolveFailure::Blocked(reason)),
            ResolveOutcome::Timeout => Err(ResolveFailure::Timeout),
            ResolveOutcome::ToolError(reason) => Err(ResolveFailure::ToolError(reason)),
        }
    }
}

impl From<ResolveFailure> for ResolveOutcome {
    fn from(failure: ResolveFailure) -> Self {
        match failure {
            ResolveFailure::NotLive => ResolveOutcome::NotLive,
            ResolveFailure::Blocked(reason) => ResolveOutcome::Blocked(reason),
            ResolveFailure::Timeout => ResolveOutcome::Timeout,
            ResolveFailure::ToolError(reason) => ResolveOutcome::ToolError(reason),
        }
    }
}

/// A failed resolution, as remembered by the registry
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolveFailure {
    #[error("Source is not live")]
    NotLive,

    #[error("Origin refused access: {0}")]
    Blocked(String),

    #[error("Resolver timed out")]
    Timeout,

    #[error("Resolver tool error: {0}")]
    ToolError(String),
}

/// Coarse failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying on the next tick
    Transient,
    /// Retry only after a longer backoff
    Blocked,
}

impl ResolveFailure {
    pub fn class(&self) -> FailureClass {
        match self {
            ResolveFailure::Blocked(_) => FailureClass::Blocked,
            _ => FailureClass::Transient,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.class() == FailureClass::Blocked
    }
}

/// Classify resolver stderr from a failed run
///
/// Not-live markers win over blocked markers: "not live" pages sometimes also
/// mention a 403 for the offline thumbnail.
pub fn classify_failure(stderr: &str) -> ResolveFailure {
    let lowered = stderr.to_lowercase();

    if NOT_LIVE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ResolveFailure::NotLive;
    }

    let reason = last_line(stderr);
    if BLOCKED_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ResolveFailure::Blocked(reason);
    }

    ResolveFailure::ToolError(reason)
}

/// Classify a finished resolver run
///
/// On success the first stdout line that parses as an http(s) URL wins; a
/// clean exit without one means there is nothing to play.
pub fn classify_output(success: bool, stdout: &str, stderr: &str) -> ResolveOutcome {
    if !success {
        return classify_failure(stderr).into();
    }

    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| {
            url::Url::parse(line)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
        .map(|line| ResolveOutcome::Success(line.to_string()))
        .unwrap_or(ResolveOutcome::NotLive)
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no diagnostic output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_url_line_wins() {
        let stdout = "\nhttps://a.example/live.m3u8\nhttps://b.example/audio.m3u8\n";
        let outcome = classify_output(true, stdout, "");
        assert_eq!(
            outcome,
            ResolveOutcome::Success("https://a.example/live.m3u8".into())
        );
    }

    #[test]
    fn test_clean_exit_without_url_is_not_live() {
        assert_eq!(classify_output(true, "  \n", ""), ResolveOutcome::NotLive);
        assert_eq!(
            classify_output(true, "NA\n", ""),
            ResolveOutcome::NotLive
        );
    }

    #[test]
    fn test_not_live_stderr() {
        let stderr = "ERROR: [youtube] abc: The channel is not currently live";
        assert_eq!(classify_output(false, "", stderr), ResolveOutcome::NotLive);

        let stderr = "ERROR: [youtube] abc: This live event will begin in 3 hours.";
        assert_eq!(classify_failure(stderr), ResolveFailure::NotLive);
    }

    #[test]
    fn test_blocked_stderr() {
        let stderr = "WARNING: retrying\nERROR: Sign in to confirm you're not a bot";
        let failure = classify_failure(stderr);
        assert!(failure.is_blocked());
        assert_eq!(
            failure,
            ResolveFailure::Blocked("ERROR: Sign in to confirm you're not a bot".into())
        );

        assert!(classify_failure("ERROR: HTTP Error 429: Too Many Requests").is_blocked());
    }

    #[test]
    fn test_unknown_stderr_is_tool_error() {
        let failure = classify_failure("Traceback (most recent call last):\nKeyError: 'x'");
        assert_eq!(failure, ResolveFailure::ToolError("KeyError: 'x'".into()));
        assert_eq!(failure.class(), FailureClass::Transient);

        assert_eq!(
            classify_failure(""),
            ResolveFailure::ToolError("no diagnostic output".into())
        );
    }

    #[test]
    fn test_outcome_failure_round_trip() {
        let outcome = ResolveOutcome::Blocked("403".into());
        let failure = outcome.clone().into_result().unwrap_err();
        assert_eq!(ResolveOutcome::from(failure), outcome);
        assert_eq!(ResolveOutcome::Success("u".into()).url(), Some("u"));
    }
}
