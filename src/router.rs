//! Inbound command routing.
//!
//! Consumes chat messages from the long-poll worker, enforces the sender
//! allow-list, resolves the target session (reply token, then the sender's
//! selected session, then the only live session), and forwards recognized
//! commands or free-form text through the pane adapter. A command is never
//! forwarded to a session the adapter cannot currently discover.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::classify::ScreenState;
use crate::config::Config;
use crate::macros::MacroTable;
use crate::mux::{ControlKey, DiscoveredPane, MuxError, PaneAdapter};
use crate::notify::{DispatchStats, SessionNameExtractor, truncate_message};
use crate::registry::ActiveSessionRegistry;
use crate::session::{normalize, slugify};
use crate::telegram::{ChatSink, Message, Update};
use crate::tracker::SessionView;

/// Commands recognized on the chat side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    ListSessions,
    Board,
    Status,
    Log(Option<usize>),
    Stop,
    Erase,
    Clear,
    Select(String),
    NewSession(String),
    KillSession,
    Pause,
    Resume,
    Help,
    /// Not a command: forwarded to the target session as input
    Forward(String),
}

/// Parse a chat message into a command. Slash commands may carry the
/// `@botname` suffix Telegram appends in group chats.
pub fn parse_command(text: &str) -> BotCommand {
    let trimmed = text.trim();
    let Some(stripped) = trimmed.strip_prefix('/') else {
        return BotCommand::Forward(trimmed.to_string());
    };

    let mut parts = stripped.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let head = head.split('@').next().unwrap_or_default().to_lowercase();
    let rest: Vec<&str> = parts.collect();

    match head.as_str() {
        "sessions" | "list" => BotCommand::ListSessions,
        "board" => BotCommand::Board,
        "status" => BotCommand::Status,
        "log" => BotCommand::Log(rest.first().and_then(|n| n.parse().ok())),
        "stop" => BotCommand::Stop,
        "erase" => BotCommand::Erase,
        "clear" => BotCommand::Clear,
        "select" if !rest.is_empty() => BotCommand::Select(rest.join(" ")),
        "new" if !rest.is_empty() => BotCommand::NewSession(rest.join(" ")),
        "kill" => BotCommand::KillSession,
        "pause" => BotCommand::Pause,
        "resume" => BotCommand::Resume,
        "help" | "start" => BotCommand::Help,
        _ => BotCommand::Forward(trimmed.to_string()),
    }
}

/// Pick the live pane for a requested (normalized) session name.
///
/// `requested == None` falls back to the single-session rule. Returns the
/// pane name as the multiplexer currently reports it, so adapter calls hit
/// the live pane even after a collision rename.
fn resolve_against_live(
    requested: Option<&str>,
    live: &[DiscoveredPane],
    full_prefix: &str,
) -> Result<String, String> {
    match requested {
        Some(name) => {
            let wanted = normalize(full_prefix, name);
            live.iter()
                .find(|p| normalize(full_prefix, &p.name) == wanted)
                .map(|p| p.name.clone())
                .ok_or_else(|| {
                    format!(
                        "session `{}` is not running{}",
                        wanted,
                        candidates_suffix(live, full_prefix)
                    )
                })
        }
        None if live.len() == 1 => Ok(live[0].name.clone()),
        None if live.is_empty() => Err("no sessions are running".to_string()),
        None => Err(format!(
            "no target session; reply to a notification or use /select{}",
            candidates_suffix(live, full_prefix)
        )),
    }
}

fn candidates_suffix(live: &[DiscoveredPane], full_prefix: &str) -> String {
    if live.is_empty() {
        return String::new();
    }
    let names: Vec<String> = live
        .iter()
        .map(|p| normalize(full_prefix, &p.name))
        .collect();
    format!("\ncandidates: {}", names.join(", "))
}

pub struct Router {
    adapter: Arc<dyn PaneAdapter>,
    sink: Arc<dyn ChatSink>,
    registry: Arc<ActiveSessionRegistry>,
    macros: MacroTable,
    extractor: SessionNameExtractor,
    config: Arc<Config>,
    board: Arc<std::sync::Mutex<Vec<SessionView>>>,
    paused: Arc<AtomicBool>,
    stats: Arc<DispatchStats>,
    ticks: Arc<AtomicU64>,
    commands_handled: AtomicU64,
    started_at: Instant,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn PaneAdapter>,
        sink: Arc<dyn ChatSink>,
        registry: Arc<ActiveSessionRegistry>,
        macros: MacroTable,
        config: Arc<Config>,
        board: Arc<std::sync::Mutex<Vec<SessionView>>>,
        paused: Arc<AtomicBool>,
        stats: Arc<DispatchStats>,
        ticks: Arc<AtomicU64>,
    ) -> Self {
        let extractor = SessionNameExtractor::new(&config.full_prefix());
        Self {
            adapter,
            sink,
            registry,
            macros,
            extractor,
            config,
            board,
            paused,
            stats,
            ticks,
            commands_handled: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Entry point for the command worker.
    pub fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.clone() else {
            return;
        };

        let Some(sender) = message.sender_id() else {
            debug!("message without sender ignored");
            return;
        };
        if !self.config.is_sender_allowed(sender) {
            warn!(sender, "command from sender outside allow-list");
            self.reply(message.chat.id, "not authorized");
            return;
        }

        self.commands_handled.fetch_add(1, Ordering::Relaxed);
        let command = parse_command(&text);
        debug!(sender, command = ?command, "handling chat command");
        self.execute(&message, sender, command);
    }

    fn execute(&self, message: &Message, sender: i64, command: BotCommand) {
        let chat = message.chat.id;
        match command {
            BotCommand::Help => self.reply(chat, HELP_TEXT),
            BotCommand::ListSessions => self.cmd_list(chat),
            BotCommand::Board => self.cmd_board(chat),
            BotCommand::Status => self.cmd_status(chat),
            BotCommand::Pause => {
                self.paused.store(true, Ordering::Relaxed);
                self.reply(chat, "notifications paused");
            }
            BotCommand::Resume => {
                self.paused.store(false, Ordering::Relaxed);
                self.reply(chat, "notifications resumed");
            }
            BotCommand::Select(name) => self.cmd_select(chat, sender, &name),
            BotCommand::NewSession(name) => self.cmd_new_session(chat, &name),
            BotCommand::Log(lines) => self.with_target(message, sender, |pane| {
                self.cmd_log(chat, pane, lines)
            }),
            BotCommand::Stop => self.with_target(message, sender, |pane| {
                self.send_key_checked(chat, pane, ControlKey::Esc, "sent ESC")
            }),
            BotCommand::Erase => self.with_target(message, sender, |pane| {
                self.send_key_checked(chat, pane, ControlKey::CtrlC, "sent Ctrl-C")
            }),
            BotCommand::Clear => self.with_target(message, sender, |pane| {
                // Form feed clears the screen without going through the
                // shell's command line.
                match self.adapter.send_text(pane, "\u{000c}") {
                    Ok(()) => self.reply(chat, &format!("cleared `{}`", pane)),
                    Err(e) => self.reply_mux_error(chat, pane, &e),
                }
            }),
            BotCommand::KillSession => self.with_target(message, sender, |pane| {
                match self.adapter.kill_session(pane) {
                    Ok(()) => {
                        info!(session = %pane, "session killed from chat");
                        self.reply(chat, &format!("killed `{}`", pane));
                    }
                    Err(e) => self.reply_mux_error(chat, pane, &e),
                }
            }),
            BotCommand::Forward(text) => self.with_target(message, sender, |pane| {
                self.cmd_forward(chat, pane, &text)
            }),
        }
    }

    /// Resolve the target session for `message`, then run `action` with the
    /// live pane name. Resolution failures are reported back to the chat.
    fn with_target<F: FnOnce(&str)>(&self, message: &Message, sender: i64, action: F) {
        let live = match self.adapter.list_sessions(&self.config.full_prefix()) {
            Ok(live) => live,
            Err(e) => {
                self.reply(message.chat.id, &format!("multiplexer unavailable: {}", e));
                return;
            }
        };

        // 1. Reply token: the replied-to message names the session.
        if let Some(reply_text) = message.reply_to_text() {
            match self.extractor.extract(reply_text) {
                Some(name) => {
                    match resolve_against_live(Some(&name), &live, &self.config.full_prefix()) {
                        Ok(pane) => action(&pane),
                        Err(e) => self.reply(message.chat.id, &e),
                    }
                }
                None => self.reply(
                    message.chat.id,
                    "no session token found in the replied message",
                ),
            }
            return;
        }

        // 2. The sender's selected session; stale selections fall through.
        if let Some(selected) = self.registry.selected(sender) {
            match resolve_against_live(Some(&selected), &live, &self.config.full_prefix()) {
                Ok(pane) => {
                    action(&pane);
                    return;
                }
                Err(_) => {
                    debug!(sender, session = %selected, "stale selection ignored");
                }
            }
        }

        // 3./4. Exactly one session, or an error naming the candidates.
        match resolve_against_live(None, &live, &self.config.full_prefix()) {
            Ok(pane) => action(&pane),
            Err(e) => self.reply(message.chat.id, &e),
        }
    }

    /// Live sessions annotated with tracked states. Discovery always goes
    /// through the adapter; the board snapshot only contributes states, so
    /// the listing stays correct when the monitor is not running.
    fn annotated_sessions(&self) -> Result<Vec<SessionView>, String> {
        let live = self
            .adapter
            .list_sessions(&self.config.full_prefix())
            .map_err(|e| format!("multiplexer unavailable: {}", e))?;
        let tracked = self.board_snapshot();
        let mut views: Vec<SessionView> = live
            .into_iter()
            .map(|pane| {
                let name = normalize(&self.config.full_prefix(), &pane.name);
                tracked
                    .iter()
                    .find(|v| v.name == name)
                    .cloned()
                    .unwrap_or(SessionView {
                        name,
                        pane_name: pane.name,
                        state: ScreenState::Unknown,
                        working_directory: pane.working_directory,
                        state_age_secs: 0,
                        started_at: pane.created_at,
                    })
            })
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    fn cmd_list(&self, chat: i64) {
        let views = match self.annotated_sessions() {
            Ok(views) => views,
            Err(e) => return self.reply(chat, &e),
        };
        if views.is_empty() {
            self.reply(chat, "no sessions");
            return;
        }
        let mut text = String::from("*sessions*\n");
        for view in &views {
            text.push_str(&format!(
                "{} `{}` — {}\n",
                state_icon(view.state),
                view.name,
                view.state.label()
            ));
        }
        self.reply(chat, text.trim_end());
    }

    fn cmd_board(&self, chat: i64) {
        let views = match self.annotated_sessions() {
            Ok(views) => views,
            Err(e) => return self.reply(chat, &e),
        };
        if views.is_empty() {
            self.reply(chat, "no sessions");
            return;
        }
        let mut text = String::from("```\n");
        for view in &views {
            text.push_str(&format!(
                "{} {:<24} {:<8} {:>6}  {}\n",
                state_icon(view.state),
                view.name,
                view.state.label(),
                format_age(view.state_age_secs),
                view.working_directory,
            ));
        }
        text.push_str("```");
        self.reply(chat, &truncate_message(text));
    }

    fn cmd_status(&self, chat: i64) {
        let adapter_ok = self.adapter.is_running().unwrap_or(false);
        let uptime = self.started_at.elapsed().as_secs();
        let text = format!(
            "*bridge status*\nadapter: {} ({})\nsessions: {}\nuptime: {}\nticks: {}\ncommands: {}\nsent: {} / suppressed: {} / failed: {}\npaused: {}",
            self.adapter.backend_name(),
            if adapter_ok { "ok" } else { "unreachable" },
            self.annotated_sessions().map(|v| v.len()).unwrap_or(0),
            format_age(uptime),
            self.ticks.load(Ordering::Relaxed),
            self.commands_handled.load(Ordering::Relaxed),
            self.stats.sent.load(Ordering::Relaxed),
            self.stats.suppressed.load(Ordering::Relaxed),
            self.stats.failed.load(Ordering::Relaxed),
            self.paused.load(Ordering::Relaxed),
        );
        self.reply(chat, &text);
    }

    fn cmd_select(&self, chat: i64, sender: i64, name: &str) {
        let live = match self.adapter.list_sessions(&self.config.full_prefix()) {
            Ok(live) => live,
            Err(e) => {
                self.reply(chat, &format!("multiplexer unavailable: {}", e));
                return;
            }
        };
        match resolve_against_live(Some(name), &live, &self.config.full_prefix()) {
            Ok(pane) => {
                let normalized = normalize(&self.config.full_prefix(), &pane);
                self.registry.select(sender, normalized.clone());
                self.reply(chat, &format!("active session: `{}`", normalized));
            }
            Err(e) => self.reply(chat, &e),
        }
    }

    fn cmd_new_session(&self, chat: i64, name: &str) {
        let slug = slugify(name);
        if slug.is_empty() {
            self.reply(chat, "usage: /new <name>");
            return;
        }
        let full = format!("{}{}", self.config.full_prefix(), slug);
        let cwd = home::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "/".to_string());
        match self.adapter.create_session(&full, &cwd) {
            Ok(()) => {
                info!(session = %full, "session created from chat");
                self.reply(chat, &format!("created `{}`", full));
            }
            Err(e) => self.reply(chat, &format!("failed to create `{}`: {}", full, e)),
        }
    }

    fn cmd_log(&self, chat: i64, pane: &str, lines: Option<usize>) {
        let requested = lines.unwrap_or(50).min(self.config.log_lines_cap as usize);
        match self.adapter.capture(pane, requested as u16) {
            Ok(capture) => {
                let tail = capture.meaningful_tail(requested);
                if tail.is_empty() {
                    self.reply(chat, &format!("`{}` has an empty screen", pane));
                    return;
                }
                let text = format!("[{}]\n```\n{}\n```", pane, tail.join("\n"));
                self.reply(chat, &truncate_message(text));
            }
            Err(e) => self.reply_mux_error(chat, pane, &e),
        }
    }

    fn cmd_forward(&self, chat: i64, pane: &str, text: &str) {
        // Bare key tokens steer the pane directly.
        if let Some(key) = ControlKey::parse(text.trim()) {
            self.send_key_checked(chat, pane, key, &format!("sent {}", text.trim()));
            return;
        }

        let expanded = self.macros.expand(text);
        let result = self
            .adapter
            .send_text(pane, &expanded)
            .and_then(|_| self.adapter.send_key(pane, ControlKey::Enter));
        match result {
            Ok(()) => {
                info!(session = %pane, chars = expanded.len(), "input forwarded");
                self.reply(chat, &format!("→ `{}`", pane));
            }
            Err(e) => self.reply_mux_error(chat, pane, &e),
        }
    }

    fn send_key_checked(&self, chat: i64, pane: &str, key: ControlKey, done: &str) {
        match self.adapter.send_key(pane, key) {
            Ok(()) => self.reply(chat, &format!("{} to `{}`", done, pane)),
            Err(e) => self.reply_mux_error(chat, pane, &e),
        }
    }

    fn reply_mux_error(&self, chat: i64, pane: &str, error: &MuxError) {
        warn!(session = %pane, error = %error, "adapter call failed");
        let text = match error {
            MuxError::NotFound(_) => format!("session `{}` vanished", pane),
            MuxError::Transient(_) => format!("multiplexer error on `{}`, try again", pane),
        };
        self.reply(chat, &text);
    }

    fn board_snapshot(&self) -> Vec<SessionView> {
        self.board
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.sink.send(chat_id, text) {
            warn!(error = %e, "failed to send chat reply");
        }
    }
}

fn state_icon(state: ScreenState) -> &'static str {
    match state {
        ScreenState::Working => "🔵",
        ScreenState::WaitingInput => "🟡",
        ScreenState::Idle => "🟢",
        ScreenState::Unknown => "⚪",
    }
}

fn format_age(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

const HELP_TEXT: &str = "\
*watchmux commands*
/sessions — list sessions with states
/board — grid view of all sessions
/status — bridge and adapter health
/log [n] — last n screen lines of the target (default 50)
/select <name> — set your active session
/new <name> — create a session
/kill — kill the target session
/stop — send ESC to the target
/erase — send Ctrl-C to the target
/clear — clear the target's screen
/pause, /resume — mute or unmute notifications
any other text is typed into the target session

target = the session named in the replied-to message, else your \
selected session, else the only running one";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FileConfig};
    use crate::mux::{MuxError, ScreenCapture};
    use crate::telegram::TransportError;
    use std::sync::Mutex;

    // --- fakes ----------------------------------------------------------

    #[derive(Default)]
    struct FakeAdapter {
        sessions: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAdapter {
        fn with_sessions(names: &[&str]) -> Self {
            Self {
                sessions: names.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PaneAdapter for FakeAdapter {
        fn backend_name(&self) -> &'static str {
            "fake"
        }
        fn is_running(&self) -> Result<bool, MuxError> {
            Ok(true)
        }
        fn list_sessions(&self, prefix: &str) -> Result<Vec<DiscoveredPane>, MuxError> {
            Ok(self
                .sessions
                .iter()
                .filter(|n| n.starts_with(prefix))
                .map(|n| DiscoveredPane {
                    name: n.clone(),
                    working_directory: "/work".to_string(),
                    created_at: None,
                })
                .collect())
        }
        fn capture(&self, name: &str, _lines: u16) -> Result<ScreenCapture, MuxError> {
            self.record(format!("capture {}", name));
            Ok(ScreenCapture::from_text("line one\nline two\n> _"))
        }
        fn send_text(&self, name: &str, text: &str) -> Result<(), MuxError> {
            self.record(format!("send_text {} {:?}", name, text));
            Ok(())
        }
        fn send_key(&self, name: &str, key: ControlKey) -> Result<(), MuxError> {
            self.record(format!("send_key {} {}", name, key.tmux_name()));
            Ok(())
        }
        fn create_session(&self, name: &str, _cwd: &str) -> Result<(), MuxError> {
            self.record(format!("create_session {}", name));
            Ok(())
        }
        fn kill_session(&self, name: &str) -> Result<(), MuxError> {
            self.record(format!("kill_session {}", name));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl ChatSink for RecordingSink {
        fn send(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(
            Config::resolve(FileConfig {
                bot_token: Some("t".to_string()),
                chat_id: Some(100),
                allowed_users: Some(vec![7]),
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn router_with(adapter: Arc<FakeAdapter>, sink: Arc<RecordingSink>) -> Router {
        Router::new(
            adapter,
            sink,
            Arc::new(ActiveSessionRegistry::new()),
            MacroTable::empty(),
            test_config(),
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(AtomicBool::new(false)),
            Arc::new(DispatchStats::default()),
            Arc::new(AtomicU64::new(0)),
        )
    }

    fn update(sender: i64, text: &str, reply_to: Option<&str>) -> Update {
        Update {
            update_id: 1,
            message: Some(Message {
                message_id: 10,
                from: Some(crate::telegram::User {
                    id: sender,
                    username: None,
                }),
                chat: crate::telegram::Chat { id: 100 },
                text: Some(text.to_string()),
                reply_to_message: reply_to.map(|t| {
                    Box::new(Message {
                        message_id: 9,
                        from: None,
                        chat: crate::telegram::Chat { id: 100 },
                        text: Some(t.to_string()),
                        reply_to_message: None,
                    })
                }),
            }),
        }
    }

    // --- parse ----------------------------------------------------------

    #[test]
    fn parse_recognized_commands() {
        assert_eq!(parse_command("/sessions"), BotCommand::ListSessions);
        assert_eq!(parse_command("/board@watchmux_bot"), BotCommand::Board);
        assert_eq!(parse_command("/log 80"), BotCommand::Log(Some(80)));
        assert_eq!(parse_command("/log"), BotCommand::Log(None));
        assert_eq!(
            parse_command("/select alpha"),
            BotCommand::Select("alpha".to_string())
        );
        assert_eq!(
            parse_command("fix the bug"),
            BotCommand::Forward("fix the bug".to_string())
        );
    }

    // --- resolution -----------------------------------------------------

    fn live(names: &[&str]) -> Vec<DiscoveredPane> {
        names
            .iter()
            .map(|n| DiscoveredPane {
                name: n.to_string(),
                working_directory: String::new(),
                created_at: None,
            })
            .collect()
    }

    #[test]
    fn resolution_prefers_requested_name() {
        let panes = live(&["claude_alpha", "claude_beta"]);
        assert_eq!(
            resolve_against_live(Some("claude_alpha"), &panes, "claude_"),
            Ok("claude_alpha".to_string())
        );
    }

    #[test]
    fn resolution_follows_collision_rename() {
        // The notification referenced claude_beta; the live pane is beta-1
        let panes = live(&["claude_beta-1"]);
        assert_eq!(
            resolve_against_live(Some("claude_beta"), &panes, "claude_"),
            Ok("claude_beta-1".to_string())
        );
    }

    #[test]
    fn resolution_single_session_fallback() {
        let panes = live(&["claude_only"]);
        assert_eq!(
            resolve_against_live(None, &panes, "claude_"),
            Ok("claude_only".to_string())
        );
    }

    #[test]
    fn resolution_ambiguous_lists_candidates() {
        let panes = live(&["claude_a", "claude_b"]);
        let err = resolve_against_live(None, &panes, "claude_").unwrap_err();
        assert!(err.contains("claude_a"));
        assert!(err.contains("claude_b"));
    }

    // --- end to end -----------------------------------------------------

    #[test]
    fn reply_routing_forwards_text_then_enter() {
        let adapter = Arc::new(FakeAdapter::with_sessions(&["claude_alpha", "claude_x"]));
        let sink = Arc::new(RecordingSink::default());
        let router = router_with(adapter.clone(), sink.clone());

        router.handle_update(update(
            7,
            "run the tests",
            Some("✅ *work complete* — [claude_alpha]"),
        ));

        assert_eq!(
            adapter.calls(),
            vec![
                "send_text claude_alpha \"run the tests\"",
                "send_key claude_alpha Enter",
            ]
        );
    }

    #[test]
    fn unauthorized_sender_never_reaches_adapter() {
        let adapter = Arc::new(FakeAdapter::with_sessions(&["claude_alpha"]));
        let sink = Arc::new(RecordingSink::default());
        let router = router_with(adapter.clone(), sink.clone());

        router.handle_update(update(999, "do something", None));

        assert!(adapter.calls().is_empty());
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "not authorized");
    }

    #[test]
    fn stop_sends_escape_to_only_session() {
        let adapter = Arc::new(FakeAdapter::with_sessions(&["claude_solo"]));
        let sink = Arc::new(RecordingSink::default());
        let router = router_with(adapter.clone(), sink.clone());

        router.handle_update(update(7, "/stop", None));

        assert_eq!(adapter.calls(), vec!["send_key claude_solo Escape"]);
    }

    #[test]
    fn bare_key_token_becomes_key_press() {
        let adapter = Arc::new(FakeAdapter::with_sessions(&["claude_solo"]));
        let sink = Arc::new(RecordingSink::default());
        let router = router_with(adapter.clone(), sink.clone());

        router.handle_update(update(7, "esc", None));

        assert_eq!(adapter.calls(), vec!["send_key claude_solo Escape"]);
    }

    #[test]
    fn select_then_forward_uses_selection() {
        let adapter = Arc::new(FakeAdapter::with_sessions(&["claude_a", "claude_b"]));
        let sink = Arc::new(RecordingSink::default());
        let router = router_with(adapter.clone(), sink.clone());

        router.handle_update(update(7, "/select claude_b", None));
        router.handle_update(update(7, "hello", None));

        assert_eq!(
            adapter.calls(),
            vec!["send_text claude_b \"hello\"", "send_key claude_b Enter"]
        );
    }
}
