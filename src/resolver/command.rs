//! External resolver tool invocation

use std::process::Stdio;

use tokio::process::Command;

use super::config::ResolverConfig;
use super::outcome::{classify_output, ResolveOutcome};

/// Resolves page references by running the resolver tool
///
/// Invocation: `{program} [extra] [--cookies file] --no-warnings -f <format> -g <reference>`.
/// The run is bounded by `ResolverConfig::timeout`; on expiry the child is
/// killed when its handle is dropped.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    config: ResolverConfig,
}

impl CommandResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Arguments for one run, without the program
    pub fn args(&self, reference: &str) -> Vec<String> {
        let mut args = self.config.extra_args.clone();
        if let Some(ref cookies) = self.config.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }
        args.extend([
            "--no-warnings".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            "-g".to_string(),
            reference.to_string(),
        ]);
        args
    }

    /// Run the tool once against `reference`
    pub async fn resolve_reference(&self, reference: &str) -> ResolveOutcome {
        let child = Command::new(&self.config.program)
            .args(self.args(reference))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    program = %self.config.program.display(),
                    error = %e,
                    "Failed to spawn resolver"
                );
                return ResolveOutcome::ToolError(format!(
                    "failed to spawn {}: {}",
                    self.config.program.display(),
                    e
                ));
            }
        };

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ResolveOutcome::ToolError(e.to_string()),
            Err(_) => {
                tracing::debug!(
                    reference = reference,
                    timeout_secs = self.config.timeout.as_secs(),
                    "Resolver timed out"
                );
                return ResolveOutcome::Timeout;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let outcome = classify_output(output.status.success(), &stdout, &stderr);
        tracing::debug!(
            reference = reference,
            status = %output.status,
            success = outcome.is_success(),
            "Resolver finished"
        );
        outcome
    }
}
