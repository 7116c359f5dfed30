//! Configuration for the bridge.
//!
//! Resolution order, lowest to highest precedence: built-in defaults, the
//! global file (`~/.config/watchmux/config.yaml`), the project file
//! (`./.watchmux.yaml`), then `WATCHMUX_*` environment variables. The result
//! is a single immutable `Config` constructed once at startup; missing
//! required values are fatal there and nowhere else.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing bot credential (set WATCHMUX_BOT_TOKEN or bot_token in config)")]
    MissingBotToken,
    #[error("missing default chat (set WATCHMUX_CHAT_ID or chat_id in config)")]
    MissingChatId,
    #[error("no allowed senders (set WATCHMUX_ALLOWED_USERS or allowed_users in config)")]
    EmptyAllowList,
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Raw configuration as found on disk / in the environment. All fields are
/// optional here; `Config::resolve` applies defaults and enforces the
/// required ones.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct FileConfig {
    /// Telegram bot token
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Default chat destination for notifications
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// Sender ids allowed to issue commands
    #[serde(default)]
    pub allowed_users: Option<Vec<i64>>,

    /// Session name prefix without the separator (default "claude")
    #[serde(default)]
    pub session_prefix: Option<String>,

    /// Monitor tick interval in seconds
    #[serde(default)]
    pub poll_interval: Option<u64>,

    /// Log level filter (overrides RUST_LOG default)
    #[serde(default)]
    pub log_level: Option<String>,

    /// Path to the macro table YAML
    #[serde(default)]
    pub macros: Option<PathBuf>,

    /// Extra waiting-prompt substrings (replaces the built-in list)
    #[serde(default)]
    pub waiting_prompts: Option<Vec<String>>,

    /// Extra case-sensitive activity tokens (appended to the built-ins)
    #[serde(default)]
    pub working_tokens: Option<Vec<String>>,

    /// Cap for the `log` chat command
    #[serde(default)]
    pub log_lines_cap: Option<u16>,
}

impl FileConfig {
    /// Load and merge global and project configuration files, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::load_global()?.unwrap_or_default();
        let project = Self::load_project()?.unwrap_or_default();
        let mut merged = global.merge(project);
        merged.apply_env()?;
        Ok(merged)
    }

    fn load_from_path(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(config))
    }

    fn load_global() -> Result<Option<Self>, ConfigError> {
        if let Some(home_dir) = home::home_dir() {
            for name in ["config.yaml", "config.yml"] {
                let path = home_dir.join(".config/watchmux").join(name);
                if path.exists() {
                    return Self::load_from_path(&path);
                }
            }
        }
        Ok(None)
    }

    fn load_project() -> Result<Option<Self>, ConfigError> {
        for name in [".watchmux.yaml", ".watchmux.yml"] {
            let path = Path::new(name);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }
        Ok(None)
    }

    /// Field-wise merge; project values win.
    fn merge(self, project: Self) -> Self {
        Self {
            bot_token: project.bot_token.or(self.bot_token),
            chat_id: project.chat_id.or(self.chat_id),
            allowed_users: project.allowed_users.or(self.allowed_users),
            session_prefix: project.session_prefix.or(self.session_prefix),
            poll_interval: project.poll_interval.or(self.poll_interval),
            log_level: project.log_level.or(self.log_level),
            macros: project.macros.or(self.macros),
            waiting_prompts: project.waiting_prompts.or(self.waiting_prompts),
            working_tokens: project.working_tokens.or(self.working_tokens),
            log_lines_cap: project.log_lines_cap.or(self.log_lines_cap),
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(token) = env::var("WATCHMUX_BOT_TOKEN")
            && !token.is_empty()
        {
            self.bot_token = Some(token);
        }
        if let Ok(chat) = env::var("WATCHMUX_CHAT_ID") {
            self.chat_id = Some(parse_i64("WATCHMUX_CHAT_ID", &chat)?);
        }
        if let Ok(users) = env::var("WATCHMUX_ALLOWED_USERS") {
            self.allowed_users = Some(parse_id_list("WATCHMUX_ALLOWED_USERS", &users)?);
        }
        if let Ok(prefix) = env::var("WATCHMUX_SESSION_PREFIX")
            && !prefix.is_empty()
        {
            self.session_prefix = Some(prefix);
        }
        if let Ok(interval) = env::var("WATCHMUX_POLL_INTERVAL") {
            let secs = interval
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    key: "WATCHMUX_POLL_INTERVAL",
                    value: interval.clone(),
                })?;
            self.poll_interval = Some(secs);
        }
        if let Ok(level) = env::var("WATCHMUX_LOG_LEVEL")
            && !level.is_empty()
        {
            self.log_level = Some(level);
        }
        if let Ok(path) = env::var("WATCHMUX_MACROS")
            && !path.is_empty()
        {
            self.macros = Some(PathBuf::from(path));
        }
        Ok(())
    }
}

/// Fully resolved, immutable configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub chat_id: i64,
    pub allowed_users: Vec<i64>,
    pub session_prefix: String,
    pub poll_interval: Duration,
    pub log_level: Option<String>,
    pub macros_path: Option<PathBuf>,
    pub working_tokens_exact: Vec<String>,
    pub working_tokens_any_case: Vec<String>,
    pub waiting_prompts: Vec<String>,
    pub log_lines_cap: u16,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(FileConfig::load()?)
    }

    pub fn resolve(raw: FileConfig) -> Result<Self, ConfigError> {
        let bot_token = raw.bot_token.ok_or(ConfigError::MissingBotToken)?;
        let chat_id = raw.chat_id.ok_or(ConfigError::MissingChatId)?;
        let allowed_users = raw.allowed_users.unwrap_or_default();
        if allowed_users.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }

        let mut working_tokens_exact = default_working_tokens_exact();
        if let Some(extra) = raw.working_tokens {
            working_tokens_exact.extend(extra);
        }

        Ok(Self {
            bot_token,
            chat_id,
            allowed_users,
            session_prefix: raw
                .session_prefix
                .unwrap_or_else(|| DEFAULT_SESSION_PREFIX.to_string()),
            poll_interval: Duration::from_secs(raw.poll_interval.unwrap_or(4).max(1)),
            log_level: raw.log_level,
            macros_path: raw.macros,
            working_tokens_exact,
            working_tokens_any_case: default_working_tokens_any_case(),
            waiting_prompts: raw.waiting_prompts.unwrap_or_else(default_waiting_prompts),
            log_lines_cap: raw.log_lines_cap.unwrap_or(200),
        })
    }

    /// The full name prefix, separator included ("claude_").
    pub fn full_prefix(&self) -> String {
        format!("{}_", self.session_prefix)
    }

    pub fn is_sender_allowed(&self, sender_id: i64) -> bool {
        self.allowed_users.contains(&sender_id)
    }
}

const DEFAULT_SESSION_PREFIX: &str = "claude";

/// Activity tokens the host tool renders with a known casing.
pub fn default_working_tokens_exact() -> Vec<String> {
    ["Running…", "Processing…", "Thinking…"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Activity phrases matched regardless of casing.
pub fn default_working_tokens_any_case() -> Vec<String> {
    vec!["esc to interrupt".to_string()]
}

/// Waiting-prompt substrings, matched case-insensitively in the buffer tail.
pub fn default_waiting_prompts() -> Vec<String> {
    [
        "ready to code",
        "bash command",
        "select option",
        "choose an option",
        "enter your choice",
        "press enter to continue",
        "waiting for input",
        "type your response",
        "what would you like",
        "how can i help",
        "continue?",
        "proceed?",
        "confirm?",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn parse_i64(key: &'static str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// Parse a comma-separated sender id list ("123, 456").
fn parse_id_list(key: &'static str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| ConfigError::Invalid {
                key,
                value: s.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> FileConfig {
        FileConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some(42),
            allowed_users: Some(vec![7]),
            ..Default::default()
        }
    }

    #[test]
    fn resolve_applies_defaults() {
        let config = Config::resolve(minimal()).unwrap();
        assert_eq!(config.session_prefix, "claude");
        assert_eq!(config.full_prefix(), "claude_");
        assert_eq!(config.poll_interval, Duration::from_secs(4));
        assert!(config.waiting_prompts.contains(&"continue?".to_string()));
    }

    #[test]
    fn resolve_requires_token_chat_and_allow_list() {
        let missing_token = FileConfig {
            bot_token: None,
            ..minimal()
        };
        assert!(matches!(
            Config::resolve(missing_token),
            Err(ConfigError::MissingBotToken)
        ));

        let missing_chat = FileConfig {
            chat_id: None,
            ..minimal()
        };
        assert!(matches!(
            Config::resolve(missing_chat),
            Err(ConfigError::MissingChatId)
        ));

        let nobody = FileConfig {
            allowed_users: Some(Vec::new()),
            ..minimal()
        };
        assert!(matches!(
            Config::resolve(nobody),
            Err(ConfigError::EmptyAllowList)
        ));
    }

    #[test]
    fn poll_interval_clamped_to_one_second() {
        let raw = FileConfig {
            poll_interval: Some(0),
            ..minimal()
        };
        let config = Config::resolve(raw).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn extra_working_tokens_are_appended() {
        let raw = FileConfig {
            working_tokens: Some(vec!["Compilando…".to_string()]),
            ..minimal()
        };
        let config = Config::resolve(raw).unwrap();
        assert!(config
            .working_tokens_exact
            .contains(&"Compilando…".to_string()));
        assert!(config
            .working_tokens_exact
            .contains(&"Thinking…".to_string()));
    }

    #[test]
    fn merge_prefers_project_values() {
        let global = FileConfig {
            session_prefix: Some("glob".to_string()),
            poll_interval: Some(10),
            ..minimal()
        };
        let project = FileConfig {
            session_prefix: Some("proj".to_string()),
            ..Default::default()
        };
        let merged = global.merge(project);
        assert_eq!(merged.session_prefix.as_deref(), Some("proj"));
        assert_eq!(merged.poll_interval, Some(10));
    }

    #[test]
    fn id_list_parsing() {
        assert_eq!(parse_id_list("k", "1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_id_list("k", "1,x").is_err());
        assert!(parse_id_list("k", "").unwrap().is_empty());
    }

    #[test]
    fn allow_list_gate() {
        let config = Config::resolve(minimal()).unwrap();
        assert!(config.is_sender_allowed(7));
        assert!(!config.is_sender_allowed(8));
    }
}
