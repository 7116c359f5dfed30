//! Per-sender active session selection.
//!
//! Commands that arrive without a reply target fall back to the sender's
//! selected session. Entries survive session disappearance; resolution
//! against the live session list happens in the router, which treats a
//! stale entry the same as no entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct ActiveSessionRegistry {
    inner: Mutex<HashMap<i64, String>>,
}

impl ActiveSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<i64, String>> {
        // A poisoned lock only means a panicking thread held it; the map
        // itself is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember `session` (normalized name) as the sender's target.
    pub fn select(&self, sender_id: i64, session: String) {
        self.guard().insert(sender_id, session);
    }

    pub fn selected(&self, sender_id: i64) -> Option<String> {
        self.guard().get(&sender_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_and_resolve() {
        let registry = ActiveSessionRegistry::new();
        assert_eq!(registry.selected(1), None);
        registry.select(1, "claude_alpha".to_string());
        assert_eq!(registry.selected(1).as_deref(), Some("claude_alpha"));
        // Another sender keeps an independent selection
        registry.select(2, "claude_beta".to_string());
        assert_eq!(registry.selected(1).as_deref(), Some("claude_alpha"));
        // Re-selecting overwrites
        registry.select(1, "claude_gamma".to_string());
        assert_eq!(registry.selected(1).as_deref(), Some("claude_gamma"));
    }
}
