use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Candidate, MessageId, Session};

/// Per-day lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Nothing announced yet today
    Idle,
    /// At least one live value announced
    LiveAnnounced,
    /// Final announced; terminal until the daily reset
    Finalized,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "IDLE",
            SessionPhase::LiveAnnounced => "LIVE_ANNOUNCED",
            SessionPhase::Finalized => "FINALIZED",
        }
    }

    /// Check if this phase can move to another within the same day
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;

        match (self, target) {
            (Idle, LiveAnnounced) => true,
            (Idle, Finalized) => true,
            // Another live value
            (LiveAnnounced, LiveAnnounced) => true,
            (LiveAnnounced, Finalized) => true,
            // Only the daily reset leaves Finalized
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable record for one session, scoped to one local calendar day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// `number|set|value` of the last live announcement
    pub live_dedup_key: Option<String>,
    /// Last live post, edited in place when live mode is `edit`
    pub live_message: Option<MessageId>,
    pub finalized: bool,
    pub final_value: Option<Candidate>,
    pub pinned_message: Option<MessageId>,
    /// Confirmed live posts today
    pub live_posts: u32,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        if self.finalized {
            SessionPhase::Finalized
        } else if self.live_dedup_key.is_some() {
            SessionPhase::LiveAnnounced
        } else {
            SessionPhase::Idle
        }
    }

    /// Record a confirmed live post
    pub fn record_live(&mut self, key: String, message: MessageId) {
        debug_assert!(self.phase().can_transition_to(SessionPhase::LiveAnnounced));
        self.live_dedup_key = Some(key);
        self.live_message = Some(message);
        self.live_posts += 1;
    }

    /// Record a confirmed final post; `pinned` is the handle only if pinning succeeded
    pub fn record_final(&mut self, candidate: Candidate, pinned: Option<MessageId>) {
        debug_assert!(self.phase().can_transition_to(SessionPhase::Finalized));
        self.finalized = true;
        self.final_value = Some(candidate);
        self.pinned_message = pinned;
    }
}

/// Both sessions plus the local day they belong to
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionBook {
    state_date: Option<NaiveDate>,
    morning: SessionState,
    evening: SessionState,
}

impl SessionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_date(&self) -> Option<NaiveDate> {
        self.state_date
    }

    pub fn get(&self, session: Session) -> &SessionState {
        match session {
            Session::Morning => &self.morning,
            Session::Evening => &self.evening,
        }
    }

    pub fn get_mut(&mut self, session: Session) -> &mut SessionState {
        match session {
            Session::Morning => &mut self.morning,
            Session::Evening => &mut self.evening,
        }
    }

    /// Reset every session when `today` differs from the stored date.
    ///
    /// Returns true when a reset happened. The first call only stamps the date.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        match self.state_date {
            Some(date) if date == today => false,
            Some(_) => {
                self.morning = SessionState::default();
                self.evening = SessionState::default();
                self.state_date = Some(today);
                true
            }
            None => {
                self.state_date = Some(today);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use SessionPhase::*;

        assert!(Idle.can_transition_to(LiveAnnounced));
        assert!(Idle.can_transition_to(Finalized));
        assert!(LiveAnnounced.can_transition_to(LiveAnnounced));
        assert!(LiveAnnounced.can_transition_to(Finalized));

        assert!(!Finalized.can_transition_to(LiveAnnounced));
        assert!(!Finalized.can_transition_to(Finalized));
        assert!(!LiveAnnounced.can_transition_to(Idle));
    }

    #[test]
    fn test_phase_follows_recorded_posts() {
        let mut state = SessionState::default();
        assert_eq!(state.phase(), SessionPhase::Idle);

        state.record_live("82|--|--".to_string(), MessageId(10));
        assert_eq!(state.phase(), SessionPhase::LiveAnnounced);
        assert_eq!(state.live_posts, 1);

        state.record_final(Candidate::live("82"), Some(MessageId(11)));
        assert_eq!(state.phase(), SessionPhase::Finalized);
        assert_eq!(state.pinned_message, Some(MessageId(11)));
    }

    #[test]
    fn test_roll_over_resets_all_sessions() {
        let day1 = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let day2 = day1.succ_opt().unwrap();

        let mut book = SessionBook::new();
        assert!(!book.roll_over(day1));
        assert_eq!(book.state_date(), Some(day1));

        book.get_mut(Session::Morning)
            .record_final(Candidate::live("82"), Some(MessageId(5)));
        book.get_mut(Session::Evening)
            .record_live("40|--|--".to_string(), MessageId(6));

        assert!(!book.roll_over(day1));
        assert!(book.get(Session::Morning).finalized);

        assert!(book.roll_over(day2));
        assert_eq!(book.state_date(), Some(day2));
        for session in Session::ALL {
            let state = book.get(session);
            assert!(!state.finalized);
            assert!(state.live_dedup_key.is_none());
            assert!(state.pinned_message.is_none());
        }
    }
}
