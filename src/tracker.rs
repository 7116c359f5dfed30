//! Per-session state tracking and edge detection.
//!
//! The tracker owns the map of monitored sessions, keyed by normalized
//! name. Each observation compares the freshly classified state against the
//! remembered one and yields the notifications the edge legally produces:
//! leaving WORKING yields a completion, entering WAITING_INPUT yields an
//! input-wait. Self-loops and transitions into WORKING or UNKNOWN are
//! silent, which gives the debouncing the notifier relies on: a waiting
//! notice can only repeat after the session left the waiting state for at
//! least one tick, and a completion is tied 1:1 to a working episode.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::classify::{Classification, ScreenState};
use crate::mux::{DiscoveredPane, ScreenCapture};
use crate::session::{Session, normalize};

/// Trailing lines carried as notification context.
const CONTEXT_TAIL_LINES: usize = 3;

/// Discovery passes a session may be absent before it is dropped.
const MAX_MISSED_PASSES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Completion,
    WaitingInput,
}

/// A notification the tracker decided must be emitted, with everything the
/// dispatcher needs. Values only; no references back into the tracker.
#[derive(Debug, Clone)]
pub struct PendingNotice {
    pub kind: NoticeKind,
    pub session_name: String,
    pub working_directory: String,
    pub context_tail: Vec<String>,
}

/// Read-only view of one tracked session, published for the board and
/// status commands.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub name: String,
    pub pane_name: String,
    pub state: ScreenState,
    pub working_directory: String,
    pub state_age_secs: u64,
    pub started_at: Option<u64>,
}

pub struct SessionTracker {
    /// Full session-name prefix, e.g. "claude_"
    prefix: String,
    sessions: HashMap<String, Session>,
}

impl SessionTracker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sessions: HashMap::new(),
        }
    }

    /// Normalize a raw pane name with this tracker's prefix.
    pub fn normalize_name(&self, raw: &str) -> String {
        normalize(&self.prefix, raw)
    }

    /// Feed one capture+classification for a discovered pane. Returns the
    /// notifications this edge produces (empty for most ticks).
    pub fn observe(
        &mut self,
        pane: &DiscoveredPane,
        classification: &Classification,
        capture: &ScreenCapture,
        now: Instant,
    ) -> Vec<PendingNotice> {
        let key = self.normalize_name(&pane.name);
        let hash = digest(capture);
        let tail = capture.meaningful_tail(CONTEXT_TAIL_LINES);

        let Some(session) = self.sessions.get_mut(&key) else {
            // First sight: record as-is, never emit on the discovery tick.
            let mut session = Session::new(
                key.clone(),
                pane.name.clone(),
                pane.working_directory.clone(),
                now,
            );
            session.last_state = classification.state;
            session.last_capture_hash = Some(hash);
            session.started_at = pane.created_at;
            session.last_tail = tail;
            info!(
                session = %key,
                state = classification.state.label(),
                "session discovered"
            );
            self.sessions.insert(key, session);
            return Vec::new();
        };

        session.pane_name = pane.name.clone();
        session.missed_passes = 0;
        if !pane.working_directory.is_empty() {
            session.working_directory = pane.working_directory.clone();
        }
        if session.started_at.is_none() {
            session.started_at = pane.created_at;
        }

        // Unchanged buffer means unchanged classification.
        if session.last_capture_hash == Some(hash) {
            return Vec::new();
        }
        session.last_capture_hash = Some(hash);

        let previous = session.last_state;
        let current = classification.state;
        if previous == current {
            session.last_tail = tail;
            return Vec::new();
        }

        debug!(
            session = %key,
            from = previous.label(),
            to = current.label(),
            evidence = %classification.evidence,
            "state edge"
        );
        session.last_state = current;
        session.last_state_change_at = now;
        let pre_transition_tail = mem::replace(&mut session.last_tail, tail.clone());

        let mut notices = Vec::new();
        if previous == ScreenState::Working
            && matches!(current, ScreenState::WaitingInput | ScreenState::Idle)
        {
            let context = if pre_transition_tail.is_empty() {
                tail.clone()
            } else {
                pre_transition_tail
            };
            notices.push(PendingNotice {
                kind: NoticeKind::Completion,
                session_name: key.clone(),
                working_directory: session.working_directory.clone(),
                context_tail: context,
            });
        }
        if current == ScreenState::WaitingInput {
            notices.push(PendingNotice {
                kind: NoticeKind::WaitingInput,
                session_name: key.clone(),
                working_directory: session.working_directory.clone(),
                context_tail: tail,
            });
        }
        if !notices.is_empty() {
            session.last_notification_at = Some(now);
        }
        notices
    }

    /// Close out a discovery pass: sessions absent from `seen` accrue a
    /// miss, and sessions missing twice in a row are dropped. Returns the
    /// names of dropped sessions.
    pub fn finish_pass(&mut self, seen: &HashSet<String>) -> Vec<String> {
        for (name, session) in self.sessions.iter_mut() {
            if seen.contains(name) {
                session.missed_passes = 0;
            } else {
                session.missed_passes = session.missed_passes.saturating_add(1);
            }
        }

        let mut removed = Vec::new();
        self.sessions.retain(|name, session| {
            if session.missed_passes >= MAX_MISSED_PASSES {
                removed.push(name.clone());
                false
            } else {
                true
            }
        });
        for name in &removed {
            info!(session = %name, "session removed after repeated absence");
        }
        removed
    }

    /// Resolve a normalized name to the live pane name, if tracked.
    pub fn live_pane_name(&self, normalized: &str) -> Option<String> {
        self.sessions.get(normalized).map(|s| s.pane_name.clone())
    }

    pub fn views(&self) -> Vec<SessionView> {
        let now = Instant::now();
        let mut views: Vec<SessionView> = self
            .sessions
            .values()
            .map(|s| SessionView {
                name: s.name.clone(),
                pane_name: s.pane_name.clone(),
                state: s.last_state,
                working_directory: s.working_directory.clone(),
                state_age_secs: now.duration_since(s.last_state_change_at).as_secs(),
                started_at: s.started_at,
            })
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }
}

fn digest(capture: &ScreenCapture) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for line in &capture.lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config;

    fn classifier() -> Classifier {
        Classifier::new(
            &config::default_working_tokens_exact(),
            &config::default_working_tokens_any_case(),
            &config::default_waiting_prompts(),
        )
    }

    fn pane(name: &str) -> DiscoveredPane {
        DiscoveredPane {
            name: name.to_string(),
            working_directory: "/work/demo".to_string(),
            created_at: Some(1_700_000_000),
        }
    }

    fn observe(
        tracker: &mut SessionTracker,
        name: &str,
        buffer: &str,
    ) -> Vec<PendingNotice> {
        let capture = ScreenCapture::from_text(buffer);
        let classification = classifier().classify(&capture);
        tracker.observe(&pane(name), &classification, &capture, Instant::now())
    }

    const WORKING_BUF: &str = "doing things\nesc to interrupt";
    const IDLE_BUF: &str = "finished the task\nall tests green\n> _";
    const WAITING_BUF: &str = "pick one\n❯ 1. Yes\n  2. No";

    #[test]
    fn no_notification_on_discovery_tick() {
        let mut tracker = SessionTracker::new("claude_");
        // Even a waiting screen is silent on first sight
        assert!(observe(&mut tracker, "claude_demo", WAITING_BUF).is_empty());
        assert_eq!(tracker.views().len(), 1);
    }

    #[test]
    fn completion_fires_once_per_working_episode() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_demo", WORKING_BUF);

        let notices = observe(&mut tracker, "claude_demo", IDLE_BUF);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Completion);
        assert_eq!(notices[0].session_name, "claude_demo");
        // Context is the pre-transition tail
        assert_eq!(
            notices[0].context_tail,
            vec!["doing things", "esc to interrupt"]
        );

        // Identical capture: no re-notification
        assert!(observe(&mut tracker, "claude_demo", IDLE_BUF).is_empty());
    }

    #[test]
    fn working_to_waiting_ends_episode_and_enters_wait() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_demo", WORKING_BUF);

        let notices = observe(&mut tracker, "claude_demo", WAITING_BUF);
        let kinds: Vec<NoticeKind> = notices.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NoticeKind::Completion, NoticeKind::WaitingInput]);

        // Still waiting: silent
        let again = observe(&mut tracker, "claude_demo", "pick one\n❯ 1. Yes\n  2. No\n");
        assert!(again.is_empty());
    }

    #[test]
    fn waiting_entry_from_idle() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_demo", IDLE_BUF);

        let notices = observe(&mut tracker, "claude_demo", WAITING_BUF);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::WaitingInput);
        // The tail that triggered the classification
        assert_eq!(
            notices[0].context_tail,
            vec!["pick one", "❯ 1. Yes", "  2. No"]
        );
    }

    #[test]
    fn waiting_can_reemit_after_leaving() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_demo", IDLE_BUF);
        assert_eq!(observe(&mut tracker, "claude_demo", WAITING_BUF).len(), 1);
        observe(&mut tracker, "claude_demo", WORKING_BUF);
        let notices = observe(&mut tracker, "claude_demo", WAITING_BUF);
        let kinds: Vec<NoticeKind> = notices.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NoticeKind::Completion, NoticeKind::WaitingInput]);
    }

    #[test]
    fn transition_into_unknown_is_silent() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_demo", WORKING_BUF);
        // Unparseable buffer: no completion
        assert!(observe(&mut tracker, "claude_demo", "garbled output lines").is_empty());
    }

    #[test]
    fn collision_suffix_maps_to_same_session() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_beta", WORKING_BUF);
        let notices = observe(&mut tracker, "claude_beta-1", IDLE_BUF);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].session_name, "claude_beta");
        assert_eq!(tracker.views().len(), 1);
        // Live pane name follows the rename
        assert_eq!(
            tracker.live_pane_name("claude_beta").as_deref(),
            Some("claude_beta-1")
        );
    }

    #[test]
    fn gc_after_two_missed_passes() {
        let mut tracker = SessionTracker::new("claude_");
        observe(&mut tracker, "claude_demo", IDLE_BUF);

        let empty = HashSet::new();
        assert!(tracker.finish_pass(&empty).is_empty());
        assert_eq!(tracker.views().len(), 1);

        // Rediscovered after a single miss: retained
        let mut seen = HashSet::new();
        seen.insert("claude_demo".to_string());
        tracker.finish_pass(&seen);
        assert_eq!(tracker.views().len(), 1);

        // Two consecutive misses: removed
        tracker.finish_pass(&empty);
        let removed = tracker.finish_pass(&empty);
        assert_eq!(removed, vec!["claude_demo".to_string()]);
        assert!(tracker.views().is_empty());
    }
}
