use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct ThrottleState {
    last_logged: Instant,
    suppressed_count: u32,
}

/// Limits how often a repeating error is logged.
///
/// The first occurrence of a key is always let through. Later ones inside the
/// cooldown are counted; the next one let through reports how many were
/// swallowed in between.
#[derive(Debug)]
pub struct ErrorThrottle {
    cooldown: Duration,
    states: HashMap<String, ThrottleState>,
}

impl ErrorThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            states: HashMap::new(),
        }
    }

    /// `Some(suppressed)` when this occurrence should be logged
    pub fn check(&mut self, key: &str) -> Option<u32> {
        let now = Instant::now();

        match self.states.get_mut(key) {
            Some(state) => {
                if now.duration_since(state.last_logged) < self.cooldown {
                    state.suppressed_count += 1;
                    return None;
                }
                let suppressed = state.suppressed_count;
                state.last_logged = now;
                state.suppressed_count = 0;
                Some(suppressed)
            }
            None => {
                self.states.insert(
                    key.to_string(),
                    ThrottleState {
                        last_logged: now,
                        suppressed_count: 0,
                    },
                );
                Some(0)
            }
        }
    }
}
