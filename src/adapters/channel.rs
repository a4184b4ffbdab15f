//! Messaging channel seam
//!
//! The publisher and command handler talk to the channel only through
//! [`MessagingApi`]. [`TelegramClient`](super::TelegramClient) is the real
//! implementation; [`DryRunChannel`] records operations in memory and logs them.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::domain::{ChatId, MessageId};
use crate::error::{Result, TwodError};

#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn send_message(&self, chat: &ChatId, text: &str) -> Result<MessageId>;

    async fn edit_message_text(&self, chat: &ChatId, message: MessageId, text: &str) -> Result<()>;

    /// Pin without notifying members
    async fn pin_message(&self, chat: &ChatId, message: MessageId) -> Result<()>;

    async fn unpin_message(&self, chat: &ChatId, message: MessageId) -> Result<()>;
}

/// Operation kinds, for scripting failures and counting attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Send,
    Edit,
    Pin,
    Unpin,
}

/// A completed channel operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Send { chat: ChatId, message: MessageId, text: String },
    Edit { chat: ChatId, message: MessageId, text: String },
    Pin { chat: ChatId, message: MessageId },
    Unpin { chat: ChatId, message: MessageId },
}

/// Failure to inject into the next matching operation
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    RateLimited(u64),
    Api(i64, String),
    Network(String),
}

impl From<ScriptedFailure> for TwodError {
    fn from(failure: ScriptedFailure) -> Self {
        match failure {
            ScriptedFailure::RateLimited(secs) => TwodError::RateLimited {
                retry_after_secs: secs,
            },
            ScriptedFailure::Api(code, description) => TwodError::Telegram { code, description },
            ScriptedFailure::Network(reason) => TwodError::Internal(reason),
        }
    }
}

#[derive(Debug, Default)]
struct DryRunLog {
    ops: Vec<ChannelOp>,
    attempts: HashMap<OpKind, usize>,
    failures: HashMap<OpKind, VecDeque<ScriptedFailure>>,
}

/// In-memory channel used by `--dry-run` and tests
#[derive(Debug)]
pub struct DryRunChannel {
    next_id: AtomicI64,
    log: Mutex<DryRunLog>,
}

impl DryRunChannel {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            log: Mutex::new(DryRunLog::default()),
        }
    }

    /// Queue a failure for the next operation of `kind`
    pub fn fail_next(&self, kind: OpKind, failure: ScriptedFailure) {
        self.with_log(|log| log.failures.entry(kind).or_default().push_back(failure));
    }

    pub fn ops(&self) -> Vec<ChannelOp> {
        self.with_log(|log| log.ops.clone())
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.with_log(|log| {
            log.ops
                .iter()
                .filter_map(|op| match op {
                    ChannelOp::Send { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn count(&self, kind: OpKind) -> usize {
        self.with_log(|log| {
            log.ops
                .iter()
                .filter(|op| {
                    matches!(
                        (op, kind),
                        (ChannelOp::Send { .. }, OpKind::Send)
                            | (ChannelOp::Edit { .. }, OpKind::Edit)
                            | (ChannelOp::Pin { .. }, OpKind::Pin)
                            | (ChannelOp::Unpin { .. }, OpKind::Unpin)
                    )
                })
                .count()
        })
    }

    /// Calls made for `kind`, failed ones included
    pub fn attempts(&self, kind: OpKind) -> usize {
        self.with_log(|log| log.attempts.get(&kind).copied().unwrap_or(0))
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut DryRunLog) -> T) -> T {
        let mut guard = match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn attempt(&self, kind: OpKind) -> Result<()> {
        self.with_log(|log| {
            *log.attempts.entry(kind).or_insert(0) += 1;
            match log.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
                Some(failure) => Err(failure.into()),
                None => Ok(()),
            }
        })
    }

    fn record(&self, op: ChannelOp) {
        self.with_log(|log| log.ops.push(op));
    }
}

impl Default for DryRunChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingApi for DryRunChannel {
    async fn send_message(&self, chat: &ChatId, text: &str) -> Result<MessageId> {
        self.attempt(OpKind::Send)?;
        let message = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        info!(target: "twod::dry_run", %chat, %message, "send\n{}", text);
        self.record(ChannelOp::Send {
            chat: chat.clone(),
            message,
            text: text.to_string(),
        });
        Ok(message)
    }

    async fn edit_message_text(&self, chat: &ChatId, message: MessageId, text: &str) -> Result<()> {
        self.attempt(OpKind::Edit)?;
        info!(target: "twod::dry_run", %chat, %message, "edit\n{}", text);
        self.record(ChannelOp::Edit {
            chat: chat.clone(),
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn pin_message(&self, chat: &ChatId, message: MessageId) -> Result<()> {
        self.attempt(OpKind::Pin)?;
        info!(target: "twod::dry_run", %chat, %message, "pin");
        self.record(ChannelOp::Pin {
            chat: chat.clone(),
            message,
        });
        Ok(())
    }

    async fn unpin_message(&self, chat: &ChatId, message: MessageId) -> Result<()> {
        self.attempt(OpKind::Unpin)?;
        info!(target: "twod::dry_run", %chat, %message, "unpin");
        self.record(ChannelOp::Unpin {
            chat: chat.clone(),
            message,
        });
        Ok(())
    }
}
