//! `watchmux config`: print the resolved configuration.

use anyhow::Result;

use crate::config::FileConfig;

pub fn run() -> Result<()> {
    let raw = FileConfig::load()?;

    println!("bot_token: {}", redact(raw.bot_token.as_deref()));
    println!("chat_id: {}", display_opt(raw.chat_id));
    println!(
        "allowed_users: {}",
        raw.allowed_users
            .as_ref()
            .map(|ids| ids
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(","))
            .unwrap_or_else(|| "<unset>".to_string())
    );
    println!(
        "session_prefix: {}",
        raw.session_prefix.as_deref().unwrap_or("claude (default)")
    );
    println!(
        "poll_interval: {}",
        raw.poll_interval
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "4s (default)".to_string())
    );
    println!(
        "log_level: {}",
        raw.log_level.as_deref().unwrap_or("info (default)")
    );
    println!(
        "macros: {}",
        raw.macros
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unset>".to_string())
    );
    Ok(())
}

fn display_opt(value: Option<i64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<unset>".to_string())
}

/// Show just enough of the credential to recognize it.
fn redact(token: Option<&str>) -> String {
    match token {
        None => "<unset>".to_string(),
        Some(t) if t.chars().count() <= 8 => "****".to_string(),
        Some(t) => format!("{}…", t.chars().take(8).collect::<String>()),
    }
}
