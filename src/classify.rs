//! Screen-buffer classification.
//!
//! Pure function from a captured buffer to a session state. Pattern lists
//! come from configuration and are compiled once at construction; the
//! classifier itself performs no I/O and identical buffers always yield
//! identical classifications.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::mux::ScreenCapture;

/// Number of trailing lines scanned for waiting-input prompts.
const WAITING_SCAN_WINDOW: usize = 5;

/// Classified state of a session's screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    Working,
    WaitingInput,
    Idle,
    Unknown,
}

impl ScreenState {
    pub fn label(self) -> &'static str {
        match self {
            ScreenState::Working => "working",
            ScreenState::WaitingInput => "waiting",
            ScreenState::Idle => "idle",
            ScreenState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub state: ScreenState,
    /// Short human-readable reason, for logs only
    pub evidence: String,
}

impl Classification {
    fn new(state: ScreenState, evidence: impl Into<String>) -> Self {
        Self {
            state,
            evidence: evidence.into(),
        }
    }
}

pub struct Classifier {
    /// Case-sensitive activity tokens (host tool uses a known casing)
    working_exact: Vec<String>,
    /// Case-insensitive activity tokens, stored lowercased
    working_any_case: Vec<String>,
    /// Waiting-prompt substrings, stored lowercased
    waiting_prompts: Vec<String>,
    /// First line of a numbered-option menu ("1." / "1)")
    menu_head: Regex,
    /// Continuation line of a numbered-option menu
    menu_item: Regex,
    /// Shell/prompt glyph ending an otherwise quiet buffer
    prompt_tail: Regex,
}

impl Classifier {
    pub fn new(
        working_exact: &[String],
        working_any_case: &[String],
        waiting_prompts: &[String],
    ) -> Self {
        Self {
            working_exact: working_exact.to_vec(),
            working_any_case: working_any_case.iter().map(|t| t.to_lowercase()).collect(),
            waiting_prompts: waiting_prompts.iter().map(|t| t.to_lowercase()).collect(),
            menu_head: Regex::new(r"^\s*1[.)]\s").unwrap(),
            menu_item: Regex::new(r"^\s*\d+[.)]\s").unwrap(),
            prompt_tail: Regex::new(r"[$%#>❯➜]\s*[_▌|]?\s*$").unwrap(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.working_tokens_exact,
            &config.working_tokens_any_case,
            &config.waiting_prompts,
        )
    }

    /// Classify a captured buffer.
    ///
    /// Rule priority is load-bearing: the host tool can render an input
    /// prompt while still executing, so any activity token anywhere in the
    /// buffer wins over waiting/idle patterns in the tail.
    pub fn classify(&self, capture: &ScreenCapture) -> Classification {
        if capture.is_empty() {
            return Classification::new(ScreenState::Unknown, "empty buffer");
        }

        if let Some(token) = self.find_working_token(capture) {
            return Classification::new(ScreenState::Working, format!("activity token {:?}", token));
        }

        let window: Vec<String> = capture
            .meaningful_tail(WAITING_SCAN_WINDOW)
            .iter()
            .map(|l| strip_box_drawing(l))
            .collect();

        if let Some(evidence) = self.find_waiting_prompt(&window) {
            return Classification::new(ScreenState::WaitingInput, evidence);
        }

        if let Some(last) = window.iter().rev().find(|l| !l.trim().is_empty())
            && self.prompt_tail.is_match(last.trim_end())
        {
            return Classification::new(ScreenState::Idle, "prompt glyph at end of buffer");
        }

        Classification::new(ScreenState::Unknown, "no recognizable pattern")
    }

    fn find_working_token(&self, capture: &ScreenCapture) -> Option<&str> {
        for line in &capture.lines {
            for token in &self.working_exact {
                if line.contains(token.as_str()) {
                    return Some(token.as_str());
                }
            }
            let lower = line.to_lowercase();
            for token in &self.working_any_case {
                if lower.contains(token.as_str()) {
                    return Some(token.as_str());
                }
            }
        }
        None
    }

    fn find_waiting_prompt(&self, window: &[String]) -> Option<String> {
        for line in window {
            let lower = line.to_lowercase();
            for prompt in &self.waiting_prompts {
                if lower.contains(prompt.as_str()) {
                    return Some(format!("waiting prompt {:?}", prompt));
                }
            }
        }

        // Numbered-option menu: a "❯"- or "1."-led line immediately
        // followed by another numbered line.
        for pair in window.windows(2) {
            let head = pair[0].trim_start();
            let next = pair[1].trim_start();
            let head_matches = head.starts_with('❯') || self.menu_head.is_match(&pair[0]);
            if head_matches && self.menu_item.is_match(next) {
                return Some("numbered option menu".to_string());
            }
        }
        None
    }
}

/// Remove box-drawing glyphs the host tool draws around prompts so pattern
/// matching sees the text itself.
fn strip_box_drawing(line: &str) -> String {
    line.chars()
        .filter(|c| !matches!(c, '─' | '│' | '┌' | '┐' | '└' | '┘' | '├' | '┤' | '┬' | '┴'
            | '┼' | '═' | '║' | '╔' | '╗' | '╚' | '╝' | '╠' | '╣' | '╦' | '╩' | '╬'
            | '╭' | '╮' | '╯' | '╰' | '╴' | '╵' | '╶' | '╷'))
        .collect()
}
