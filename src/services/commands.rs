//! Bot commands sent to the bot in chat

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::format::{self, ACCESS_DENIED};
use super::publisher::with_rate_limit_retry;
use super::Metrics;
use crate::adapters::{MessagingApi, ResultSource, Update};
use crate::domain::{Candidate, ChatId, Session};
use crate::engine::{Clock, ResultEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Test,
    MyId,
    History,
    ForceFinal(Session),
}

impl Command {
    /// Parse `/name` or `/name@botname`, case-insensitive, trailing text ignored.
    ///
    /// Returns the command and the `@botname` it was addressed to, if any.
    pub fn parse(text: &str) -> Option<(Self, Option<&str>)> {
        let first = text.split_whitespace().next()?;
        let raw = first.strip_prefix('/')?;
        let (name, target) = match raw.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (raw, None),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "start" | "help" => Command::Start,
            "status" => Command::Status,
            "test" => Command::Test,
            "myid" => Command::MyId,
            "history" => Command::History,
            "forcemorning" => Command::ForceFinal(Session::Morning),
            "forceevening" => Command::ForceFinal(Session::Evening),
            _ => return None,
        };
        Some((command, target))
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Command::ForceFinal(_))
    }
}

pub struct CommandHandler {
    api: Arc<dyn MessagingApi>,
    engine: Arc<Mutex<ResultEngine>>,
    source: Arc<dyn ResultSource>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    admin_id: Option<i64>,
    bot_username: Option<String>,
}

impl CommandHandler {
    pub fn new(
        api: Arc<dyn MessagingApi>,
        engine: Arc<Mutex<ResultEngine>>,
        source: Arc<dyn ResultSource>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        admin_id: Option<i64>,
    ) -> Self {
        Self {
            api,
            engine,
            source,
            clock,
            metrics,
            admin_id,
            bot_username: None,
        }
    }

    /// Ignore commands addressed to other bots in group chats
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    fn is_admin(&self, sender: Option<i64>) -> bool {
        matches!((self.admin_id, sender), (Some(admin), Some(sender)) if admin == sender)
    }

    /// Handle one update; returns the reply when one was sent
    pub async fn handle_update(&self, update: &Update) -> Option<String> {
        let message = update.message.as_ref()?;
        let text = message.text.as_deref()?;
        let (command, target) = Command::parse(text)?;

        if let (Some(target), Some(own)) = (target, self.bot_username.as_deref()) {
            if !target.eq_ignore_ascii_case(own) {
                debug!(addressed_to = target, "Command for another bot ignored");
                return None;
            }
        }

        let sender = message.from.as_ref().map(|u| u.id);
        self.metrics.inc_commands();
        info!(?command, sender = ?sender, chat = message.chat.id, "Command received");

        let reply = self.reply_for(command, sender).await;
        let chat = ChatId::from(message.chat.id);
        if let Err(e) =
            with_rate_limit_retry("reply", || self.api.send_message(&chat, &reply)).await
        {
            warn!(chat = %chat, "Reply failed: {}", e);
        }
        Some(reply)
    }

    async fn reply_for(&self, command: Command, sender: Option<i64>) -> String {
        if command.is_privileged() && !self.is_admin(sender) {
            return ACCESS_DENIED.to_string();
        }

        match command {
            Command::Start => format::start_text(self.is_admin(sender)),
            Command::Status => {
                let snapshot = self.engine.lock().await.snapshot();
                format::status_text(&snapshot, &self.metrics.snapshot())
            }
            Command::Test => {
                let now = self.clock.now();
                let sample = Candidate::live("88")
                    .with_set("1,234.56")
                    .with_value("12,345.67");
                format!(
                    "🧪 Preview only, nothing was posted:\n\n{}",
                    format::live_post(self.preview_session(&now).await, &sample, &now)
                )
            }
            Command::MyId => match sender {
                Some(id) => format!("🆔 Your Telegram id: `{}`", id),
                None => "🆔 Your Telegram id is not visible in this chat.".to_string(),
            },
            Command::History => {
                let engine = self.engine.lock().await;
                format::history_text(engine.history().newest_first())
            }
            Command::ForceFinal(session) => self.force_final(session).await,
        }
    }

    async fn preview_session(&self, now: &chrono::NaiveDateTime) -> Session {
        let engine = self.engine.lock().await;
        if engine.config().evening.window.start.is_at_or_after(now) {
            Session::Evening
        } else {
            Session::Morning
        }
    }

    async fn force_final(&self, session: Session) -> String {
        let results = match self.source.fetch_results().await {
            Ok(results) => results,
            Err(e) => {
                return format!(
                    "⚠️ Could not read the result page: {}",
                    format::escape_markdown(&e.to_string())
                )
            }
        };

        let now = self.clock.now();
        let mut engine = self.engine.lock().await;
        match engine.force_final(session, &results, &now).await {
            Ok(receipt) if receipt.pinned => {
                format!("✅ {} final posted and pinned.", session.label())
            }
            Ok(_) => format!("✅ {} final posted, but pinning failed.", session.label()),
            Err(e) => format!(
                "⚠️ {} final not posted: {}",
                session.label(),
                format::escape_markdown(&e.to_string())
            ),
        }
    }
}
