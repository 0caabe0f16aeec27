//! Encoder child process
//!
//! The encoder runs as the leader of its own process group so teardown can
//! reach every helper it forks. Dropping an [`EncoderProcess`] that was never
//! reaped kills the whole group.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::BytesMut;
#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::Instrument;

use super::config::EncoderCommand;

/// A running encoder with its stdout captured
#[derive(Debug)]
pub struct EncoderProcess {
    child: Child,
    stdout: ChildStdout,
    pid: Option<u32>,
    reaped: bool,
}

impl EncoderProcess {
    /// Spawn `command` followed by `args` in a new process group
    pub fn spawn(command: &EncoderCommand, args: &[String]) -> io::Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.pre_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("encoder stdout was not captured"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr).in_current_span());
        }

        tracing::debug!(pid = ?pid, program = %command.program.display(), "Encoder spawned");

        Ok(Self {
            child,
            stdout,
            pid,
            reaped: false,
        })
    }

    /// OS process id (also the process group id)
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Read the next piece of stdout into `buf`
    ///
    /// Returns 0 at EOF. Cancel safe.
    pub async fn read_chunk(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        self.stdout.read_buf(buf).await
    }

    /// Wait for the encoder to exit on its own
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status)
    }

    /// Stop the whole process group and reap the leader
    ///
    /// SIGTERM first; whatever is still around after `grace` gets SIGKILL.
    pub async fn terminate(mut self, grace: Duration) -> Option<ExitStatus> {
        if self.reaped {
            return self.child.try_wait().ok().flatten();
        }

        self.signal_group(GroupSignal::Terminate);

        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to wait for encoder");
                None
            }
            Err(_) => {
                tracing::debug!(pid = ?self.pid, "Encoder ignored SIGTERM, killing");
                None
            }
        };

        // Sweep helpers that outlived the leader
        self.signal_group(GroupSignal::Kill);

        let status = match status {
            Some(status) => Some(status),
            None => self.child.wait().await.ok(),
        };
        self.reaped = true;

        tracing::debug!(pid = ?self.pid, status = ?status, "Encoder terminated");
        status
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: GroupSignal) {
        let Some(pid) = self.pid else {
            return;
        };
        let signal = match signal {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };

        match killpg(Pid::from_raw(pid as i32), signal) {
            // Group already gone
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                tracing::warn!(pid, signal = ?signal, error = %e, "Failed to signal encoder group")
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: GroupSignal) {
        let _ = self.child.start_kill();
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        if !self.reaped {
            self.signal_group(GroupSignal::Kill);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Drain encoder stderr so the pipe never fills up
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            tracing::debug!(line = %line, "encoder stderr");
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::super::test_util::{is_gone, wait_for};
    use super::*;

    fn sh(script: &str) -> EncoderCommand {
        EncoderCommand::new("sh").pre_args(["-c", script, "sh"])
    }

    #[tokio::test]
    async fn test_read_until_eof() {
        let mut process = EncoderProcess::spawn(&sh("printf hello"), &[]).unwrap();
        let mut buf = BytesMut::with_capacity(64);

        while process.read_chunk(&mut buf).await.unwrap() > 0 {}
        assert_eq!(&buf[..], b"hello");

        let status = process.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_args_are_passed() {
        let args = vec!["one".to_string(), "two words".to_string()];
        let mut process = EncoderProcess::spawn(&sh("printf '%s|' \"$@\""), &args).unwrap();
        let mut buf = BytesMut::with_capacity(64);

        while process.read_chunk(&mut buf).await.unwrap() > 0 {}
        assert_eq!(&buf[..], b"one|two words|");
    }

    #[tokio::test]
    async fn test_terminate_kills_group() {
        // The backgrounded sleep is a second member of the group
        let mut process =
            EncoderProcess::spawn(&sh("sleep 30 & echo $!; while :; do sleep 1; done"), &[]).unwrap();
        let leader = process.id().unwrap();

        let mut buf = BytesMut::with_capacity(64);
        process.read_chunk(&mut buf).await.unwrap();
        let helper: u32 = std::str::from_utf8(&buf).unwrap().trim().parse().unwrap();

        process.terminate(Duration::from_secs(2)).await;

        assert!(is_gone(leader));
        assert!(wait_for(Duration::from_secs(2), || is_gone(helper)).await);
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_sigkill() {
        let mut process =
            EncoderProcess::spawn(&sh("trap '' TERM; echo up; while :; do sleep 0.05; done"), &[])
                .unwrap();
        let leader = process.id().unwrap();

        let mut buf = BytesMut::with_capacity(64);
        process.read_chunk(&mut buf).await.unwrap();

        let started = std::time::Instant::now();
        let status = process.terminate(Duration::from_millis(200)).await;

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(status.is_some_and(|s| !s.success()));
        assert!(is_gone(leader));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let result = EncoderProcess::spawn(&EncoderCommand::new("/nonexistent/encoder"), &[]);
        assert!(result.is_err());
    }
}
