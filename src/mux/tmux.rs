//! tmux backend for the pane adapter.
//!
//! Sessions are tmux sessions; the monitored buffer is the active pane of
//! the session's current window. Every call shells out to `tmux` with a
//! bounded wait so a wedged server cannot stall a monitor tick.

use std::time::Duration;

use tracing::trace;

use crate::cmd::Cmd;
use crate::mux::{ControlKey, DiscoveredPane, MuxError, PaneAdapter, ScreenCapture};

/// Bound on any single tmux invocation. tmux is local; captures normally
/// return in milliseconds.
const TMUX_CALL_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }

    fn query(&self, args: &[&str]) -> Result<String, MuxError> {
        Cmd::new("tmux")
            .args(args)
            .timeout(TMUX_CALL_TIMEOUT)
            .run_and_capture_stdout()
            .map_err(|e| classify_error(&e.to_string()))
    }

    fn command(&self, args: &[&str]) -> Result<(), MuxError> {
        Cmd::new("tmux")
            .args(args)
            .timeout(TMUX_CALL_TIMEOUT)
            .run()
            .map(|_| ())
            .map_err(|e| classify_error(&e.to_string()))
    }

    /// Exact-name target. The `=` prevents tmux prefix-matching a different
    /// session when the requested one is gone.
    fn target(name: &str) -> String {
        format!("={}", name)
    }
}

impl Default for TmuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// tmux reports a missing target on stderr; everything else is assumed
/// retryable.
fn classify_error(message: &str) -> MuxError {
    let lower = message.to_lowercase();
    if lower.contains("can't find session")
        || lower.contains("can't find pane")
        || lower.contains("can't find window")
        || lower.contains("session not found")
        || lower.contains("no server running")
        || lower.contains("error connecting to")
    {
        MuxError::NotFound(message.to_string())
    } else {
        MuxError::Transient(message.to_string())
    }
}

impl PaneAdapter for TmuxAdapter {
    fn backend_name(&self) -> &'static str {
        "tmux"
    }

    fn is_running(&self) -> Result<bool, MuxError> {
        Cmd::new("tmux")
            .arg("has-session")
            .run_as_check()
            .map_err(|e| MuxError::Transient(e.to_string()))
    }

    fn list_sessions(&self, prefix: &str) -> Result<Vec<DiscoveredPane>, MuxError> {
        // list-sessions errors out when no server is running; an empty
        // bridge with no sessions is not an error for discovery.
        let output = match self.query(&[
            "list-sessions",
            "-F",
            "#{session_name}\t#{session_path}\t#{session_created}",
        ]) {
            Ok(out) => out,
            Err(MuxError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let panes = parse_session_lines(&output, prefix);
        trace!(count = panes.len(), prefix, "tmux:list_sessions");
        Ok(panes)
    }

    fn capture(&self, name: &str, lines: u16) -> Result<ScreenCapture, MuxError> {
        let start_line = format!("-{}", lines);
        let target = Self::target(name);
        let raw = self.query(&["capture-pane", "-p", "-t", &target, "-S", &start_line])?;
        let stripped = strip_ansi_escapes::strip_str(&raw);
        Ok(ScreenCapture::from_text(&stripped))
    }

    fn send_text(&self, name: &str, text: &str) -> Result<(), MuxError> {
        // -l sends the characters literally so tmux doesn't interpret
        // key names embedded in the text.
        let target = Self::target(name);
        self.command(&["send-keys", "-t", &target, "-l", text])
    }

    fn send_key(&self, name: &str, key: ControlKey) -> Result<(), MuxError> {
        let target = Self::target(name);
        self.command(&["send-keys", "-t", &target, key.tmux_name()])
    }

    fn create_session(&self, name: &str, cwd: &str) -> Result<(), MuxError> {
        self.command(&["new-session", "-d", "-s", name, "-c", cwd])
    }

    fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        let target = Self::target(name);
        self.command(&["kill-session", "-t", &target])
    }
}

/// Parse `list-sessions -F "name\tpath\tcreated"` output, keeping only
/// sessions under `prefix`. Lines missing fields still yield a pane with
/// empty path / no creation time; a truncated format string from an older
/// tmux must not hide a session from discovery.
fn parse_session_lines(output: &str, prefix: &str) -> Vec<DiscoveredPane> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let name = parts.next()?;
            if name.is_empty() || !name.starts_with(prefix) {
                return None;
            }
            Some(DiscoveredPane {
                name: name.to_string(),
                working_directory: parts.next().unwrap_or_default().to_string(),
                created_at: parts.next().and_then(|s| s.parse::<u64>().ok()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- classify_error -------------------------------------------------

    #[test]
    fn missing_target_stderr_is_not_found() {
        for stderr in [
            "Command failed: tmux send-keys\ncan't find session: claude_gone",
            "can't find pane: %4",
            "no server running on /tmp/tmux-1000/default",
            "error connecting to /tmp/tmux-1000/default (No such file or directory)",
        ] {
            assert!(
                matches!(classify_error(stderr), MuxError::NotFound(_)),
                "expected NotFound for {:?}",
                stderr
            );
        }
    }

    #[test]
    fn other_stderr_is_transient() {
        for stderr in [
            "Command timed out after 3s: tmux capture-pane",
            "lost server",
            "",
        ] {
            assert!(
                matches!(classify_error(stderr), MuxError::Transient(_)),
                "expected Transient for {:?}",
                stderr
            );
        }
    }

    // --- parse_session_lines --------------------------------------------

    #[test]
    fn parses_full_lines_and_filters_by_prefix() {
        let output = "claude_alpha\t/work/alpha\t1700000000\n\
                      other_session\t/tmp\t1700000001\n\
                      claude_beta-1\t/work/beta\t1700000002";
        let panes = parse_session_lines(output, "claude_");

        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].name, "claude_alpha");
        assert_eq!(panes[0].working_directory, "/work/alpha");
        assert_eq!(panes[0].created_at, Some(1_700_000_000));
        assert_eq!(panes[1].name, "claude_beta-1");
    }

    #[test]
    fn short_lines_still_discover_the_session() {
        // Name only, and name+path: both stay discoverable
        let panes = parse_session_lines("claude_bare\nclaude_half\t/work", "claude_");
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].working_directory, "");
        assert_eq!(panes[0].created_at, None);
        assert_eq!(panes[1].working_directory, "/work");
        assert_eq!(panes[1].created_at, None);
    }

    #[test]
    fn malformed_fields_degrade_without_dropping() {
        // Non-numeric creation time is best-effort metadata, not an error
        let panes = parse_session_lines("claude_x\t/work\tnot-a-number", "claude_");
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].created_at, None);
    }

    #[test]
    fn empty_output_and_blank_lines_yield_nothing() {
        assert!(parse_session_lines("", "claude_").is_empty());
        assert!(parse_session_lines("\n\n", "claude_").is_empty());
    }

    #[test]
    fn exact_target_pins_the_session_name() {
        assert_eq!(TmuxAdapter::target("claude_alpha"), "=claude_alpha");
    }
}
