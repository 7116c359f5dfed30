//! Multiplexer abstraction for the pane side of the bridge.
//!
//! The adapter is deliberately stateless: it enumerates sessions matching a
//! name prefix, captures visible pane buffers, and injects keystrokes. All
//! session bookkeeping lives in the tracker; the adapter may be called
//! concurrently from any worker.

pub mod tmux;

use std::sync::Arc;
use std::time::SystemTime;

pub use tmux::TmuxAdapter;

/// A session visible to the multiplexer right now.
#[derive(Debug, Clone)]
pub struct DiscoveredPane {
    /// Name as reported by the multiplexer (collision suffix included)
    pub name: String,
    /// Working directory of the session's active pane, best effort
    pub working_directory: String,
    /// Creation time (unix seconds), best effort
    pub created_at: Option<u64>,
}

/// A captured visible buffer, already stripped of ANSI escapes.
#[derive(Debug, Clone)]
pub struct ScreenCapture {
    pub lines: Vec<String>,
    pub captured_at: SystemTime,
}

impl ScreenCapture {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            captured_at: SystemTime::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    /// Last `n` lines with content, oldest first. Used for notification
    /// context and the waiting-prompt scan window.
    pub fn meaningful_tail(&self, n: usize) -> Vec<String> {
        let mut tail: Vec<String> = self
            .lines
            .iter()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .take(n)
            .map(|l| l.trim_end().to_string())
            .collect();
        tail.reverse();
        tail
    }
}

/// Errors at the adapter boundary.
///
/// `NotFound` means the pane vanished between discovery and the operation;
/// `Transient` is retryable once per tick at the caller's discretion.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("multiplexer call failed: {0}")]
    Transient(String),
}

/// Named control keys the command channel can forward to a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Enter,
    Esc,
    CtrlC,
    CtrlU,
    Tab,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
}

impl ControlKey {
    /// The tmux send-keys name for this key.
    pub fn tmux_name(self) -> &'static str {
        match self {
            ControlKey::Enter => "Enter",
            ControlKey::Esc => "Escape",
            ControlKey::CtrlC => "C-c",
            ControlKey::CtrlU => "C-u",
            ControlKey::Tab => "Tab",
            ControlKey::Up => "Up",
            ControlKey::Down => "Down",
            ControlKey::Left => "Left",
            ControlKey::Right => "Right",
            ControlKey::PageUp => "PageUp",
            ControlKey::PageDown => "PageDown",
        }
    }

    /// Parse a chat-side key token ("esc", "ctrl-c", "pgup", ...).
    pub fn parse(token: &str) -> Option<ControlKey> {
        match token.to_ascii_lowercase().as_str() {
            "enter" => Some(ControlKey::Enter),
            "esc" | "escape" => Some(ControlKey::Esc),
            "ctrl-c" | "ctrl+c" => Some(ControlKey::CtrlC),
            "ctrl-u" | "ctrl+u" => Some(ControlKey::CtrlU),
            "tab" => Some(ControlKey::Tab),
            "up" => Some(ControlKey::Up),
            "down" => Some(ControlKey::Down),
            "left" => Some(ControlKey::Left),
            "right" => Some(ControlKey::Right),
            "pgup" | "pageup" => Some(ControlKey::PageUp),
            "pgdn" | "pagedown" => Some(ControlKey::PageDown),
            _ => None,
        }
    }
}

/// Main trait for the pane side. Implementations must be Send + Sync so a
/// single instance can be shared across the monitor and router workers.
pub trait PaneAdapter: Send + Sync {
    /// Returns the name of this backend (e.g. "tmux")
    fn backend_name(&self) -> &'static str;

    /// Check if the multiplexer server is reachable
    fn is_running(&self) -> Result<bool, MuxError>;

    /// All sessions whose name starts with `prefix`
    fn list_sessions(&self, prefix: &str) -> Result<Vec<DiscoveredPane>, MuxError>;

    /// Capture the visible buffer of the named session's active pane,
    /// up to `lines` rows from the bottom.
    fn capture(&self, name: &str, lines: u16) -> Result<ScreenCapture, MuxError>;

    /// Write literal characters to the session's stdin
    fn send_text(&self, name: &str, text: &str) -> Result<(), MuxError>;

    /// Send a named control key
    fn send_key(&self, name: &str, key: ControlKey) -> Result<(), MuxError>;

    /// Create a detached session with the given (already prefixed) name
    fn create_session(&self, name: &str, cwd: &str) -> Result<(), MuxError>;

    /// Kill a session by name
    fn kill_session(&self, name: &str) -> Result<(), MuxError>;
}

/// Create the default adapter. tmux is the only backend at present; the
/// trait object keeps the seam the rest of the code is written against.
pub fn create_adapter() -> Arc<dyn PaneAdapter> {
    Arc::new(TmuxAdapter::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_key_parse_aliases() {
        assert_eq!(ControlKey::parse("ESC"), Some(ControlKey::Esc));
        assert_eq!(ControlKey::parse("ctrl-c"), Some(ControlKey::CtrlC));
        assert_eq!(ControlKey::parse("pgdn"), Some(ControlKey::PageDown));
        assert_eq!(ControlKey::parse("bogus"), None);
    }

    #[test]
    fn meaningful_tail_skips_blank_lines() {
        let cap = ScreenCapture::from_text("one\n\ntwo\n   \nthree\n\n");
        assert_eq!(cap.meaningful_tail(2), vec!["two", "three"]);
    }

    #[test]
    fn empty_capture_detection() {
        assert!(ScreenCapture::from_text("\n  \n").is_empty());
        assert!(!ScreenCapture::from_text("x").is_empty());
    }
}
