//! Channel and chat message templates (Telegram Markdown)

use chrono::NaiveDateTime;

use crate::domain::{Candidate, HistoryEntry, Session, PLACEHOLDER};
use crate::engine::EngineSnapshot;
use crate::services::MetricsSnapshot;

pub const ACCESS_DENIED: &str = "⛔ This command is for the bot admin only.";

/// `Oct 16 • 2026, 11:10 AM`
pub fn pretty_time(now: &NaiveDateTime) -> String {
    now.format("%b %d • %Y, %-I:%M %p").to_string()
}

fn header(session: Session, now: &NaiveDateTime) -> String {
    format!(
        "╭───────────╮\n│ {} │\n╰───────────╯\n📅 {}",
        session.label(),
        pretty_time(now)
    )
}

fn figures(candidate: &Candidate) -> String {
    format!(
        "📊 *SET*\n🟢 *{}*\n\n💰 *VALUE*\n🔵 *{}*",
        candidate.set_or_placeholder(),
        candidate.value_or_placeholder()
    )
}

fn number(candidate: &Candidate) -> &str {
    candidate.usable_number().unwrap_or(PLACEHOLDER)
}

pub fn live_post(session: Session, candidate: &Candidate, now: &NaiveDateTime) -> String {
    format!(
        "{}\n\n🎯 *Now 2D* : 🔴 *{}*\n\n{}",
        header(session, now),
        number(candidate),
        figures(candidate)
    )
}

pub fn final_post(session: Session, candidate: &Candidate, now: &NaiveDateTime) -> String {
    format!(
        "{}\n\n🎯 *Now 2D* : *{}* ✅\n\n{}",
        header(session, now),
        number(candidate),
        figures(candidate)
    )
}

/// Escape free text for legacy Markdown so it renders literally
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn start_text(is_admin: bool) -> String {
    let mut text = String::from(
        "👋 *2D Live Bot*\n\
         Live and final 2D results are posted to the channel automatically.\n\n\
         /status - session state\n\
         /history - recent results\n\
         /test - preview a live post\n\
         /myid - your Telegram id",
    );
    if is_admin {
        text.push_str("\n/forcemorning - post the morning final now\n/forceevening - post the evening final now");
    }
    text
}

pub fn status_text(snapshot: &EngineSnapshot, metrics: &MetricsSnapshot) -> String {
    let mut lines = vec![format!(
        "📋 *Status* ({})",
        snapshot
            .state_date
            .map(|d| d.format("%d %b %Y").to_string())
            .unwrap_or_else(|| "not started".to_string())
    )];

    for s in &snapshot.sessions {
        let mut line = format!("\n{} `{}`", s.session.label(), s.phase);
        if !s.enabled {
            line.push_str(" (disabled)");
        }
        line.push_str(&format!("\nWindow: {}", s.window));
        if let Some(key) = &s.live_dedup_key {
            line.push_str(&format!("\nLast live: `{}` ({} today)", key, s.live_posts));
        }
        if let Some(number) = &s.final_number {
            line.push_str(&format!("\nFinal: *{}*", number));
        }
        line.push_str(&format!("\nPinned: {}", if s.pinned { "yes" } else { "no" }));
        lines.push(line);
    }

    lines.push(format!(
        "\n📈 Ticks {} • Fetch errors {} • Live {} • Final {} • Send errors {} • Commands {}",
        metrics.ticks,
        metrics.fetch_failures,
        metrics.live_posts,
        metrics.final_posts,
        metrics.publish_failures,
        metrics.commands
    ));
    lines.join("\n")
}

pub fn history_text<'a>(entries: impl Iterator<Item = &'a HistoryEntry>) -> String {
    let lines: Vec<String> = entries
        .map(|e| format!("{} *{}*  {}", e.session.label(), e.number, e.local_timestamp_label))
        .collect();

    if lines.is_empty() {
        return "📜 No results recorded yet.".to_string();
    }
    format!("📜 *Recent results*\n\n{}", lines.join("\n"))
}
