//! Live/final result state machine
//!
//! Per session and local day: `IDLE -> LIVE_ANNOUNCED* -> FINALIZED`. The engine
//! decides from each poll's candidates whether to announce, publishes through
//! [`Publisher`], and only records an announcement once the channel confirmed it.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{minutes_of_day, HourMinute, TimeWindow};
use crate::config::{AppConfig, ScheduledPost, SessionConfig};
use crate::domain::{
    Candidate, ExtractedResults, HistoryEntry, HistoryRing, MessageId, Session, SessionBook,
    SessionPhase, SessionState,
};
use crate::error::{Result, TwodError};
use crate::services::format::pretty_time;
use crate::services::{FinalReceipt, Metrics, Publisher};

/// Gating for one session
#[derive(Debug, Clone)]
pub struct SessionRules {
    pub enabled: bool,
    pub window: TimeWindow,
    pub final_cutoff: HourMinute,
    pub final_label: String,
}

impl SessionRules {
    pub fn from_config(cfg: &SessionConfig) -> Result<Self> {
        Ok(Self {
            enabled: cfg.enabled,
            window: cfg.window().map_err(TwodError::InvalidConfig)?,
            final_cutoff: cfg.final_cutoff,
            final_label: cfg.final_label.trim().to_string(),
        })
    }

    /// A final marker is trusted when its label is the official one, or once
    /// the cutoff has passed
    pub fn is_authoritative_final(&self, candidate: &Candidate, now: &NaiveDateTime) -> bool {
        candidate.final_marker
            && (self.label_matches(candidate.timestamp_label.as_deref())
                || self.final_cutoff.is_at_or_after(now))
    }

    fn label_matches(&self, label: Option<&str>) -> bool {
        label
            .map(|l| l.trim().eq_ignore_ascii_case(&self.final_label))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub morning: SessionRules,
    pub evening: SessionRules,
    pub scheduled_posts: Vec<ScheduledPost>,
    pub scheduled_post_grace_mins: u32,
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            morning: SessionRules::from_config(&config.sessions.morning)?,
            evening: SessionRules::from_config(&config.sessions.evening)?,
            scheduled_posts: config.scheduled_posts.clone(),
            scheduled_post_grace_mins: config.schedule.scheduled_post_grace_mins,
        })
    }

    pub fn rules(&self, session: Session) -> &SessionRules {
        match session {
            Session::Morning => &self.morning,
            Session::Evening => &self.evening,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    Finalized,
    Disabled,
    OutsideWindow,
    NoNumber,
    Duplicate,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Finalized => "already finalized",
            SkipReason::Disabled => "session disabled",
            SkipReason::OutsideWindow => "outside window",
            SkipReason::NoNumber => "no usable number",
            SkipReason::Duplicate => "unchanged live value",
        }
    }
}

/// What the engine would do with a candidate right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    PostLive { key: String },
    PostFinal,
}

/// Per-session result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    LivePosted(MessageId),
    FinalPosted(FinalReceipt),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TickReport {
    /// The local day changed and all sessions were reset
    pub rolled_over: bool,
    pub outcomes: Vec<(Session, Outcome)>,
}

impl TickReport {
    pub fn outcome(&self, session: Session) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == session)
            .map(|(_, o)| o)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HousekeepingReport {
    pub rolled_over: bool,
    /// Texts of scheduled posts sent during this pass
    pub posted: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub enabled: bool,
    pub window: TimeWindow,
    pub phase: SessionPhase,
    pub live_dedup_key: Option<String>,
    pub live_posts: u32,
    pub final_number: Option<String>,
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub state_date: Option<NaiveDate>,
    pub sessions: Vec<SessionSnapshot>,
    pub last_pinned: Option<MessageId>,
    pub history_len: usize,
}

pub struct ResultEngine {
    config: EngineConfig,
    publisher: Publisher,
    metrics: Arc<Metrics>,
    book: SessionBook,
    history: HistoryRing,
    /// Most recently pinned final in the channel; survives the daily reset so
    /// the next day's first final can unpin it
    last_pinned: Option<MessageId>,
    /// Indexes into `config.scheduled_posts` already sent on `book.state_date()`
    posted_today: HashSet<usize>,
}

impl ResultEngine {
    pub fn new(config: EngineConfig, publisher: Publisher, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            publisher,
            metrics,
            book: SessionBook::new(),
            history: HistoryRing::default(),
            last_pinned: None,
            posted_today: HashSet::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self, session: Session) -> &SessionState {
        self.book.get(session)
    }

    pub fn state_date(&self) -> Option<NaiveDate> {
        self.book.state_date()
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    pub fn last_pinned(&self) -> Option<MessageId> {
        self.last_pinned
    }

    /// Decide without side effects
    pub fn decide(&self, session: Session, candidate: &Candidate, now: &NaiveDateTime) -> Decision {
        let rules = self.config.rules(session);
        let state = self.book.get(session);

        if state.finalized {
            return Decision::Skip(SkipReason::Finalized);
        }
        if !rules.enabled {
            return Decision::Skip(SkipReason::Disabled);
        }
        if !rules.window.contains(now) {
            return Decision::Skip(SkipReason::OutsideWindow);
        }
        let Some(key) = candidate.dedup_key() else {
            return Decision::Skip(SkipReason::NoNumber);
        };
        if rules.is_authoritative_final(candidate, now) {
            return Decision::PostFinal;
        }
        if state.live_dedup_key.as_deref() == Some(key.as_str()) {
            return Decision::Skip(SkipReason::Duplicate);
        }
        Decision::PostLive { key }
    }

    /// Reset every session when the local date moved on
    pub fn roll_over(&mut self, now: &NaiveDateTime) -> bool {
        let today = now.date();
        let previous = self.book.state_date();
        let rolled = self.book.roll_over(today);
        if rolled {
            self.posted_today.clear();
            info!(
                from = ?previous,
                to = %today,
                "New local day, session state reset"
            );
        }
        rolled
    }

    /// One engine tick over freshly extracted results
    pub async fn evaluate(&mut self, results: &ExtractedResults, now: &NaiveDateTime) -> TickReport {
        let rolled_over = self.roll_over(now);
        self.metrics.inc_ticks();

        let mut outcomes = Vec::with_capacity(Session::ALL.len());
        for session in Session::ALL {
            let outcome = self.evaluate_session(session, results.get(session), now).await;
            outcomes.push((session, outcome));
        }

        TickReport {
            rolled_over,
            outcomes,
        }
    }

    async fn evaluate_session(
        &mut self,
        session: Session,
        candidate: &Candidate,
        now: &NaiveDateTime,
    ) -> Outcome {
        match self.decide(session, candidate, now) {
            Decision::Skip(reason) => {
                debug!(%session, reason = reason.as_str(), number = ?candidate.number, "Skipped");
                Outcome::Skipped(reason)
            }
            Decision::PostLive { key } => {
                let existing = self.book.get(session).live_message;
                match self.publisher.post_live(session, candidate, now, existing).await {
                    Ok(message) => {
                        self.book.get_mut(session).record_live(key, message);
                        self.metrics.inc_live_posts();
                        Outcome::LivePosted(message)
                    }
                    Err(e) => {
                        self.metrics.inc_publish_failures();
                        error!(%session, key = %key, "Live post failed: {}", e);
                        Outcome::Failed(e.to_string())
                    }
                }
            }
            Decision::PostFinal => match self.publish_final(session, candidate, now).await {
                Ok(receipt) => Outcome::FinalPosted(receipt),
                Err(e) => {
                    error!(%session, number = ?candidate.number, "Final post failed: {}", e);
                    Outcome::Failed(e.to_string())
                }
            },
        }
    }

    /// Post the session's current candidate as final, bypassing window and
    /// final-marker gating
    pub async fn force_final(
        &mut self,
        session: Session,
        results: &ExtractedResults,
        now: &NaiveDateTime,
    ) -> Result<FinalReceipt> {
        self.roll_over(now);

        if self.book.get(session).finalized {
            return Err(TwodError::Validation(format!(
                "{} result was already announced today",
                session
            )));
        }
        let candidate = results.get(session);
        if candidate.usable_number().is_none() {
            return Err(TwodError::Validation(format!(
                "no usable {} number on the result page right now",
                session
            )));
        }

        info!(%session, number = ?candidate.number, "Forcing final");
        self.publish_final(session, candidate, now).await
    }

    async fn publish_final(
        &mut self,
        session: Session,
        candidate: &Candidate,
        now: &NaiveDateTime,
    ) -> Result<FinalReceipt> {
        let previous_pin = self.book.get(session).pinned_message.or(self.last_pinned);

        let receipt = match self
            .publisher
            .post_final(session, candidate, now, previous_pin)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.metrics.inc_publish_failures();
                return Err(e);
            }
        };

        if receipt.pinned {
            self.last_pinned = Some(receipt.message_id);
        } else if receipt.unpinned.is_some() && receipt.unpinned == self.last_pinned {
            self.last_pinned = None;
        }

        let number = candidate.usable_number().unwrap_or_default().to_string();
        self.history.push(HistoryEntry {
            session,
            number: number.clone(),
            local_timestamp_label: pretty_time(now),
        });
        self.book
            .get_mut(session)
            .record_final(candidate.clone(), receipt.pinned.then_some(receipt.message_id));
        self.metrics.inc_final_posts();

        info!(
            %session,
            number = %number,
            message = %receipt.message_id,
            pinned = receipt.pinned,
            "Session finalized"
        );
        Ok(receipt)
    }

    /// Slow-timer pass: daily reset check and scheduled informational posts
    pub async fn run_housekeeping(&mut self, now: &NaiveDateTime) -> HousekeepingReport {
        let rolled_over = self.roll_over(now);
        let minute = minutes_of_day(now);
        let grace = self.config.scheduled_post_grace_mins;

        let due: Vec<(usize, String)> = self
            .config
            .scheduled_posts
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.posted_today.contains(idx))
            .filter(|(_, post)| {
                minute >= post.at.minutes_of_day() && minute <= post.at.plus_minutes(grace)
            })
            .map(|(idx, post)| (idx, post.text.clone()))
            .collect();

        let mut posted = Vec::new();
        for (idx, text) in due {
            match self.publisher.post_text(&text).await {
                Ok(message) => {
                    info!(%message, "Scheduled post sent");
                    self.posted_today.insert(idx);
                    posted.push(text);
                }
                Err(e) => {
                    self.metrics.inc_publish_failures();
                    warn!("Scheduled post failed, will retry: {}", e);
                }
            }
        }

        HousekeepingReport {
            rolled_over,
            posted,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let sessions = Session::ALL
            .iter()
            .map(|&session| {
                let rules = self.config.rules(session);
                let state = self.book.get(session);
                SessionSnapshot {
                    session,
                    enabled: rules.enabled,
                    window: rules.window,
                    phase: state.phase(),
                    live_dedup_key: state.live_dedup_key.clone(),
                    live_posts: state.live_posts,
                    final_number: state
                        .final_value
                        .as_ref()
                        .and_then(|c| c.usable_number())
                        .map(str::to_string),
                    pinned: state.pinned_message.is_some(),
                }
            })
            .collect();

        EngineSnapshot {
            state_date: self.book.state_date(),
            sessions,
            last_pinned: self.last_pinned,
            history_len: self.history.len(),
        }
    }
}
