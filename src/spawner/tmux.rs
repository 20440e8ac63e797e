//! Terminal multiplexer client.
//!
//! Shells out to `tmux` with a bounded timeout per call; pane ids are
//! validated before being interpolated into argument lists to prevent
//! command injection.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TeamsError};

/// tmux pane ids as printed by `#{pane_id}` (e.g. `%42`).
static PANE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%\d+$").expect("invalid PANE_ID_PATTERN regex"));

fn validate_pane_id(pane_id: &str) -> Result<()> {
    if !PANE_ID_PATTERN.is_match(pane_id) {
        return Err(TeamsError::InvalidArg(format!(
            "invalid tmux pane id: {}",
            pane_id
        )));
    }
    Ok(())
}

/// Client for the installed tmux binary.
#[derive(Debug, Clone)]
pub struct TmuxClient {
    /// Per-call subprocess timeout.
    timeout: Duration,
    /// Open agents in windows instead of split panes.
    use_windows: bool,
    /// Scrollback lines captured for health hashing.
    capture_lines: u32,
}

impl TmuxClient {
    pub fn new(timeout_secs: u64, use_windows: bool, capture_lines: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            use_windows,
            capture_lines,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let future = tokio::process::Command::new("tmux").args(args).output();
        match tokio::time::timeout(self.timeout, future).await {
            Err(_) => Err(TeamsError::Timeout(format!(
                "tmux {} did not respond within {}s",
                args.first().unwrap_or(&""),
                self.timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(TeamsError::Spawn(format!("failed to run tmux: {}", e))),
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// Split a new pane (or open a new window) in the current session,
    /// running `command` with working directory `cwd`. Returns the new
    /// pane's id as reported on the splitter's stdout.
    pub async fn spawn_pane(&self, cwd: &str, command: &str) -> Result<String> {
        let subcommand = if self.use_windows {
            "new-window"
        } else {
            "split-window"
        };
        let output = self
            .run(&[
                subcommand,
                "-d",
                "-P",
                "-F",
                "#{pane_id}",
                "-c",
                cwd,
                command,
            ])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TeamsError::Spawn(format!(
                "tmux {} failed: {}",
                subcommand,
                stderr.trim()
            )));
        }
        let pane_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !PANE_ID_PATTERN.is_match(&pane_id) {
            return Err(TeamsError::Spawn(format!(
                "tmux {} returned unexpected pane id '{}'",
                subcommand, pane_id
            )));
        }
        Ok(pane_id)
    }

    /// Kill a pane. A pane that is already gone is a success.
    pub async fn kill_pane(&self, pane_id: &str) -> Result<()> {
        validate_pane_id(pane_id)?;
        let output = self.run(&["kill-pane", "-t", pane_id]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("can't find pane") || stderr.contains("no such pane") {
                tracing::debug!(pane_id, "kill-pane: pane already gone");
                return Ok(());
            }
            return Err(TeamsError::Spawn(format!(
                "tmux kill-pane failed for {}: {}",
                pane_id,
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Whether the pane exists and its process has not exited. An absent
    /// pane reports not-alive; a timeout propagates as `ErrTimeout` so the
    /// caller can classify the probe as unknown.
    pub async fn is_pane_alive(&self, pane_id: &str) -> Result<bool> {
        validate_pane_id(pane_id)?;
        let output = self
            .run(&["display-message", "-p", "-t", pane_id, "#{pane_dead}"])
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "0")
    }

    /// Capture the visible pane buffer.
    pub async fn capture_pane(&self, pane_id: &str) -> Result<String> {
        validate_pane_id(pane_id)?;
        let start_line = format!("-{}", self.capture_lines);
        let output = self
            .run(&["capture-pane", "-p", "-t", pane_id, "-S", &start_line])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TeamsError::Spawn(format!(
                "tmux capture-pane failed for {}: {}",
                pane_id,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pane_id_valid() {
        assert!(validate_pane_id("%0").is_ok());
        assert!(validate_pane_id("%42").is_ok());
        assert!(validate_pane_id("%1234").is_ok());
    }

    #[test]
    fn test_validate_pane_id_invalid() {
        assert!(validate_pane_id("").is_err());
        assert!(validate_pane_id("42").is_err());
        assert!(validate_pane_id("%42x").is_err());
        assert!(validate_pane_id("%42; rm -rf /").is_err());
        assert!(validate_pane_id("main:0.1").is_err());
    }

    #[tokio::test]
    async fn test_kill_pane_rejects_bad_id_before_subprocess() {
        let client = TmuxClient::new(5, false, 100);
        let err = client.kill_pane("$(whoami)").await.unwrap_err();
        assert_eq!(err.kind(), "ErrInvalidArg");
    }
}
