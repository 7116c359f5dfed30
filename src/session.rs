use std::time::Instant;

use crate::classify::ScreenState;

/// Canonicalize a session name for identity and lookup.
///
/// tmux resolves name collisions by appending `-1`, `-2`, ... to the
/// requested name. Those suffixes are unstable across restarts, so equality
/// and map keys always use the normalized form: configured prefix ensured,
/// trailing `-<digits>` stripped.
pub fn normalize(prefix: &str, name: &str) -> String {
    let with_prefix = if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{}{}", prefix, name)
    };
    strip_numeric_suffix(&with_prefix)
}

fn strip_numeric_suffix(name: &str) -> String {
    if let Some(idx) = name.rfind('-') {
        let suffix = &name[idx + 1..];
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return name[..idx].to_string();
        }
    }
    name.to_string()
}

/// Turn a user-supplied name into a session slug (lowercase, `-` for runs of
/// anything that isn't alphanumeric). Used by the `new-session` chat command.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Tracked state for one monitored session. Keyed by normalized name; the
/// raw pane name (suffix included) is kept so adapter calls target the live
/// pane.
#[derive(Debug, Clone)]
pub struct Session {
    /// Normalized name (map key, notification token)
    pub name: String,
    /// Name as the multiplexer currently reports it (may carry `-N`)
    pub pane_name: String,
    /// Last known working directory, best effort
    pub working_directory: String,
    pub last_state: ScreenState,
    /// Digest of the last captured buffer, used to skip unchanged screens
    pub last_capture_hash: Option<[u8; 32]>,
    pub last_state_change_at: Instant,
    pub last_notification_at: Option<Instant>,
    /// Pane creation time reported by the multiplexer (unix seconds)
    pub started_at: Option<u64>,
    /// Meaningful tail of the previous capture, used as completion context
    pub last_tail: Vec<String>,
    /// Consecutive discovery passes in which the pane was absent
    pub missed_passes: u8,
}

impl Session {
    pub fn new(name: String, pane_name: String, working_directory: String, now: Instant) -> Self {
        Self {
            name,
            pane_name,
            working_directory,
            last_state: ScreenState::Unknown,
            last_capture_hash: None,
            last_state_change_at: now,
            last_notification_at: None,
            started_at: None,
            last_tail: Vec::new(),
            missed_passes: 0,
        }
    }
}
