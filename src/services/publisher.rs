//! Turns engine decisions into channel operations

use chrono::NaiveDateTime;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapters::MessagingApi;
use crate::config::LiveMode;
use crate::domain::{Candidate, ChatId, MessageId, Session};
use crate::error::Result;
use crate::services::format;

/// Outcome of a confirmed final post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalReceipt {
    pub message_id: MessageId,
    /// Pinning succeeded
    pub pinned: bool,
    /// Previously pinned message that was unpinned
    pub unpinned: Option<MessageId>,
}

pub struct Publisher {
    api: Arc<dyn MessagingApi>,
    chat: ChatId,
    live_mode: LiveMode,
}

impl Publisher {
    pub fn new(api: Arc<dyn MessagingApi>, chat: ChatId, live_mode: LiveMode) -> Self {
        Self {
            api,
            chat,
            live_mode,
        }
    }

    /// Announce a live value; returns the message now showing it.
    ///
    /// In edit mode `existing` is edited in place. An edit that fails for any
    /// reason other than rate limiting falls back to a new message.
    pub async fn post_live(
        &self,
        session: Session,
        candidate: &Candidate,
        now: &NaiveDateTime,
        existing: Option<MessageId>,
    ) -> Result<MessageId> {
        let text = format::live_post(session, candidate, now);

        if let (LiveMode::Edit, Some(message)) = (self.live_mode, existing) {
            let edited = with_rate_limit_retry("edit", || {
                self.api.edit_message_text(&self.chat, message, &text)
            })
            .await;
            match edited {
                Ok(()) => {
                    info!(%session, %message, "Live post edited");
                    return Ok(message);
                }
                Err(e) if e.is_rate_limited() => return Err(e),
                Err(e) => warn!(%session, %message, "Edit failed, sending new live post: {}", e),
            }
        }

        let message = self.send(&text).await?;
        info!(%session, %message, number = ?candidate.usable_number(), "Live post sent");
        Ok(message)
    }

    /// Send the final, unpin `previous_pin` (best effort), pin the new message
    pub async fn post_final(
        &self,
        session: Session,
        candidate: &Candidate,
        now: &NaiveDateTime,
        previous_pin: Option<MessageId>,
    ) -> Result<FinalReceipt> {
        let text = format::final_post(session, candidate, now);
        let message_id = self.send(&text).await?;
        info!(%session, message = %message_id, number = ?candidate.usable_number(), "Final post sent");

        let mut unpinned = None;
        if let Some(previous) = previous_pin.filter(|p| *p != message_id) {
            match with_rate_limit_retry("unpin", || self.api.unpin_message(&self.chat, previous)).await
            {
                Ok(()) => unpinned = Some(previous),
                Err(e) => debug!(%session, message = %previous, "Unpin failed: {}", e),
            }
        }

        let pinned =
            match with_rate_limit_retry("pin", || self.api.pin_message(&self.chat, message_id)).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(%session, message = %message_id, "Pin failed, final stays unpinned: {}", e);
                    false
                }
            };

        Ok(FinalReceipt {
            message_id,
            pinned,
            unpinned,
        })
    }

    /// Auxiliary informational post
    pub async fn post_text(&self, text: &str) -> Result<MessageId> {
        self.send(text).await
    }

    async fn send(&self, text: &str) -> Result<MessageId> {
        with_rate_limit_retry("send", || self.api.send_message(&self.chat, text)).await
    }
}

/// Run `call`; on a rate limit sleep for the advertised delay and try exactly once more
pub async fn with_rate_limit_retry<T, F, Fut>(op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match call().await {
        Err(e) if e.is_rate_limited() => {
            let wait = e.retry_after().unwrap_or(1);
            warn!(op, retry_after_secs = wait, "Rate limited, retrying once");
            tokio::time::sleep(Duration::from_secs(wait)).await;
            call().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ChannelOp, DryRunChannel, OpKind, ScriptedFailure};
    use chrono::NaiveDate;
    use tokio::time::Instant;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(11, 10, 0)
            .unwrap()
    }

    fn publisher(mode: LiveMode) -> (Arc<DryRunChannel>, Publisher) {
        let channel = Arc::new(DryRunChannel::new());
        let publisher = Publisher::new(channel.clone(), ChatId::from("@twod"), mode);
        (channel, publisher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_send_retried_once_after_delay() {
        let (channel, publisher) = publisher(LiveMode::Post);
        channel.fail_next(OpKind::Send, ScriptedFailure::RateLimited(3));

        let started = Instant::now();
        let message = publisher
            .post_live(Session::Morning, &Candidate::live("82"), &now(), None)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(message, MessageId(1));
        assert_eq!(channel.attempts(OpKind::Send), 2);
        assert_eq!(channel.count(OpKind::Send), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_propagates() {
        let (channel, publisher) = publisher(LiveMode::Post);
        channel.fail_next(OpKind::Send, ScriptedFailure::RateLimited(1));
        channel.fail_next(OpKind::Send, ScriptedFailure::RateLimited(1));

        let err = publisher.post_text("hello").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(channel.attempts(OpKind::Send), 2);
        assert_eq!(channel.count(OpKind::Send), 0);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let (channel, publisher) = publisher(LiveMode::Post);
        channel.fail_next(
            OpKind::Send,
            ScriptedFailure::Api(400, "Bad Request: chat not found".to_string()),
        );

        assert!(publisher.post_text("hello").await.is_err());
        assert_eq!(channel.attempts(OpKind::Send), 1);
    }

    #[tokio::test]
    async fn test_final_unpins_previous_then_pins() {
        let (channel, publisher) = publisher(LiveMode::Post);
        let receipt = publisher
            .post_final(Session::Morning, &Candidate::live("82"), &now(), Some(MessageId(40)))
            .await
            .unwrap();

        assert!(receipt.pinned);
        assert_eq!(receipt.unpinned, Some(MessageId(40)));

        let ops = channel.ops();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], ChannelOp::Send { .. }));
        assert!(matches!(ops[1], ChannelOp::Unpin { message: MessageId(40), .. }));
        assert!(matches!(ops[2], ChannelOp::Pin { message, .. } if message == receipt.message_id));
    }

    #[tokio::test]
    async fn test_unpin_and_pin_failures_do_not_fail_final() {
        let (channel, publisher) = publisher(LiveMode::Post);
        channel.fail_next(OpKind::Unpin, ScriptedFailure::Api(400, "message not found".to_string()));
        channel.fail_next(OpKind::Pin, ScriptedFailure::Network("connection reset".to_string()));

        let receipt = publisher
            .post_final(Session::Evening, &Candidate::live("47"), &now(), Some(MessageId(7)))
            .await
            .unwrap();

        assert!(!receipt.pinned);
        assert_eq!(receipt.unpinned, None);
        assert_eq!(channel.count(OpKind::Send), 1);
    }

    #[tokio::test]
    async fn test_edit_mode_edits_and_falls_back() {
        let (channel, publisher) = publisher(LiveMode::Edit);

        let first = publisher
            .post_live(Session::Morning, &Candidate::live("82"), &now(), None)
            .await
            .unwrap();
        let edited = publisher
            .post_live(Session::Morning, &Candidate::live("83"), &now(), Some(first))
            .await
            .unwrap();
        assert_eq!(edited, first);
        assert_eq!(channel.count(OpKind::Edit), 1);

        channel.fail_next(
            OpKind::Edit,
            ScriptedFailure::Api(400, "Bad Request: message to edit not found".to_string()),
        );
        let replacement = publisher
            .post_live(Session::Morning, &Candidate::live("84"), &now(), Some(first))
            .await
            .unwrap();
        assert_ne!(replacement, first);
        assert_eq!(channel.count(OpKind::Send), 2);
    }
}
