//! Notification formatting and delivery.
//!
//! Every outbound message carries the session name in a fixed, bracketed
//! position on its first line so a later reply can be routed back without
//! any server-side state. `extract_session_name` is the inverse and accepts
//! every format this module has ever produced.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::session::normalize;
use crate::telegram::ChatSink;
use crate::tracker::{NoticeKind, PendingNotice};

/// Telegram hard payload limit in characters.
const MESSAGE_LIMIT: usize = 4096;
const TRUNCATION_MARKER: &str = "… (truncated)";

/// Minimum spacing between identical (session, kind) messages. Edge
/// triggering already yields one notice per episode; this guards against
/// flapping screens right after a restart.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(10);

const DELIVERY_ATTEMPTS: u32 = 3;

/// Render a pending notice into the outbound message text.
pub fn format_notice(notice: &PendingNotice) -> String {
    let (icon, title) = match notice.kind {
        NoticeKind::Completion => ("✅", "work complete"),
        NoticeKind::WaitingInput => ("⌨️", "waiting for input"),
    };
    let now = Local::now();

    let mut text = format!("{} *{}* — [{}]\n", icon, title, notice.session_name);
    text.push_str(&format!("session: `{}`\n", notice.session_name));
    if !notice.working_directory.is_empty() {
        text.push_str(&format!("dir: {}\n", notice.working_directory));
    }
    text.push_str(&format!("time: {}\n", now.format("%H:%M:%S")));

    if !notice.context_tail.is_empty() {
        text.push_str("```\n");
        for line in &notice.context_tail {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("```\n");
    }

    text.push_str("_reply to this message to send a command to the session_");
    truncate_message(text)
}

/// Clamp a message to the platform limit, marking the cut. The session
/// token and timestamp sit at the top, so they survive any truncation.
pub fn truncate_message(text: String) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text;
    }
    let keep = MESSAGE_LIMIT - TRUNCATION_MARKER.chars().count() - 1;
    let mut cut: String = text.chars().take(keep).collect();
    cut.push('\n');
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Recover a session name from previously emitted message text.
///
/// Accepts, in order: the bracketed token `[name]`, the backticked
/// `session: \`name\`` line, and a bare prefixed token anywhere in the
/// text. The result is normalized (prefix ensured, collision suffix
/// stripped).
pub struct SessionNameExtractor {
    full_prefix: String,
    bracketed: Regex,
    backticked: Regex,
    bare: Regex,
}

impl SessionNameExtractor {
    pub fn new(full_prefix: &str) -> Self {
        Self {
            full_prefix: full_prefix.to_string(),
            bracketed: Regex::new(r"\[([A-Za-z0-9][A-Za-z0-9_.-]*)\]").unwrap(),
            backticked: Regex::new(r"session:\s*`([^`]+)`").unwrap(),
            bare: Regex::new(&format!(
                r"{}[A-Za-z0-9][A-Za-z0-9_.-]*",
                regex::escape(full_prefix)
            ))
            .unwrap(),
        }
    }

    pub fn extract(&self, text: &str) -> Option<String> {
        if let Some(caps) = self.bracketed.captures(text) {
            return Some(normalize(&self.full_prefix, &caps[1]));
        }
        if let Some(caps) = self.backticked.captures(text) {
            return Some(normalize(&self.full_prefix, &caps[1]));
        }
        self.bare
            .find(text)
            .map(|m| normalize(&self.full_prefix, m.as_str()))
    }
}

/// Counters shared with the `status` chat command.
#[derive(Default)]
pub struct DispatchStats {
    pub sent: std::sync::atomic::AtomicU64,
    pub suppressed: std::sync::atomic::AtomicU64,
    pub failed: std::sync::atomic::AtomicU64,
}

/// Outbound side of the bridge: formats, deduplicates, rate-limits, and
/// delivers notices to the configured chat.
pub struct Notifier {
    sink: Arc<dyn ChatSink>,
    chat_id: i64,
    paused: Arc<AtomicBool>,
    stats: Arc<DispatchStats>,
    recent: HashMap<(String, NoticeKind), Instant>,
}

impl Notifier {
    pub fn new(
        sink: Arc<dyn ChatSink>,
        chat_id: i64,
        paused: Arc<AtomicBool>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            sink,
            chat_id,
            paused,
            stats,
            recent: HashMap::new(),
        }
    }

    /// Deliver one notice. Transient transport failures are retried with a
    /// short backoff; a notice that still fails is dropped with a warning
    /// (the next legal edge will produce a fresh one).
    pub fn dispatch(&mut self, notice: &PendingNotice) {
        if self.paused.load(Ordering::Relaxed) {
            debug!(session = %notice.session_name, "notification suppressed (paused)");
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let key = (notice.session_name.clone(), notice.kind);
        let now = Instant::now();
        if let Some(last) = self.recent.get(&key)
            && now.duration_since(*last) < DUPLICATE_WINDOW
        {
            debug!(session = %notice.session_name, "duplicate notification suppressed");
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let text = format_notice(notice);
        let mut delay = Duration::from_secs(1);
        for attempt in 1..=DELIVERY_ATTEMPTS {
            match self.sink.send(self.chat_id, &text) {
                Ok(_) => {
                    info!(
                        session = %notice.session_name,
                        kind = ?notice.kind,
                        "notification sent"
                    );
                    self.recent.insert(key, now);
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < DELIVERY_ATTEMPTS => {
                    debug!(error = %e, attempt, "notification send failed, retrying");
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                Err(e) => {
                    warn!(error = %e, session = %notice.session_name, "notification dropped");
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Forget dedup state for sessions that no longer exist.
    pub fn forget_sessions(&mut self, removed: &[String]) {
        self.recent
            .retain(|(session, _), _| !removed.contains(session));
    }
}
