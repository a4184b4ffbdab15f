use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, shown by `/status`
#[derive(Debug, Default)]
pub struct Metrics {
    /// Engine ticks that ran on fetched data
    pub ticks: AtomicU64,
    /// Page fetches that failed
    pub fetch_failures: AtomicU64,
    /// Live announcements sent
    pub live_posts: AtomicU64,
    /// Final announcements sent
    pub final_posts: AtomicU64,
    /// Channel operations that failed after retry
    pub publish_failures: AtomicU64,
    /// Inbound commands handled
    pub commands: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub fetch_failures: u64,
    pub live_posts: u64,
    pub final_posts: u64,
    pub publish_failures: u64,
    pub commands: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_ticks(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_live_posts(&self) {
        self.live_posts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_final_posts(&self) {
        self.final_posts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_publish_failures(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_commands(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            live_posts: self.live_posts.load(Ordering::Relaxed),
            final_posts: self.final_posts.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
        }
    }

    /// One-line summary for logs and `/status`
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Ticks: {} | Fetch failures: {} | Live: {} | Final: {} | Publish failures: {} | Commands: {}",
            s.ticks, s.fetch_failures, s.live_posts, s.final_posts, s.publish_failures, s.commands
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_feed_snapshot() {
        let metrics = Metrics::new();
        metrics.inc_ticks();
        metrics.inc_ticks();
        metrics.inc_live_posts();
        metrics.inc_publish_failures();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.live_posts, 1);
        assert_eq!(snapshot.final_posts, 0);
        assert!(metrics.summary().contains("Publish failures: 1"));
    }
}
