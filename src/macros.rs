//! Macro expansion for inbound chat text.
//!
//! A macro is a short token at the start of a message (or the whole
//! message) that expands to a longer canned prompt from the configured
//! YAML table. Expansion is textual and single-pass: the result is never
//! rescanned, so macros cannot expand other macros.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

#[derive(Default)]
pub struct MacroTable {
    entries: HashMap<String, String>,
}

impl MacroTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a `token: expansion` map from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read macro table at {}", path.display()))?;
        let entries: HashMap<String, String> = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse macro table at {}", path.display()))?;
        info!(count = entries.len(), path = %path.display(), "macro table loaded");
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Expand a leading macro token. Unknown tokens pass through unchanged.
    pub fn expand(&self, text: &str) -> String {
        let trimmed = text.trim_start();
        let token = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default();
        let Some(expansion) = self.entries.get(token) else {
            return text.to_string();
        };

        let rest = trimmed[token.len()..].trim_start();
        if rest.is_empty() {
            expansion.clone()
        } else {
            format!("{} {}", expansion, rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MacroTable {
        let mut entries = HashMap::new();
        entries.insert(
            "fixci".to_string(),
            "Inspect the failing CI run and fix the root cause".to_string(),
        );
        entries.insert("lint".to_string(), "Run the linter and fix findings".to_string());
        MacroTable::from_entries(entries)
    }

    #[test]
    fn standalone_token_expands() {
        assert_eq!(
            table().expand("fixci"),
            "Inspect the failing CI run and fix the root cause"
        );
    }

    #[test]
    fn leading_token_keeps_trailing_text() {
        assert_eq!(
            table().expand("lint but only src/"),
            "Run the linter and fix findings but only src/"
        );
    }

    #[test]
    fn unknown_token_passes_through() {
        assert_eq!(table().expand("run the tests"), "run the tests");
    }

    #[test]
    fn token_in_middle_is_not_expanded() {
        assert_eq!(table().expand("please fixci now"), "please fixci now");
    }

    #[test]
    fn load_reads_yaml_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.yaml");
        std::fs::write(&path, "fixci: Inspect the failing CI run\nlint: Run the linter\n")
            .unwrap();

        let table = MacroTable::load(&path).unwrap();
        assert_eq!(table.expand("fixci"), "Inspect the failing CI run");
        assert_eq!(table.expand("unrelated"), "unrelated");
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.yaml");
        std::fs::write(&path, "- just\n- a\n- list\n").unwrap();
        assert!(MacroTable::load(&path).is_err());
    }

    #[test]
    fn expansion_is_single_pass() {
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), "b c".to_string());
        entries.insert("b".to_string(), "LOOP".to_string());
        let table = MacroTable::from_entries(entries);
        // "a" expands to text starting with "b", which is not rescanned
        assert_eq!(table.expand("a"), "b c");
        // Re-expanding already-expanded text without macro tokens is a no-op
        let expanded = table.expand("run it");
        assert_eq!(table.expand(&expanded), expanded);
    }
}
