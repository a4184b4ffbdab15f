//! Fast poll timer and slow housekeeping timer

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::{ErrorThrottle, Metrics};
use crate::adapters::ResultSource;
use crate::engine::{Clock, HousekeepingReport, ResultEngine, TickReport};

const FETCH_ERROR_KEY: &str = "fetch";

pub struct Scheduler {
    engine: Arc<Mutex<ResultEngine>>,
    source: Arc<dyn ResultSource>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    housekeeping_interval: Duration,
    fetch_errors: ErrorThrottle,
}

impl Scheduler {
    pub fn new(
        engine: Arc<Mutex<ResultEngine>>,
        source: Arc<dyn ResultSource>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        poll_interval: Duration,
        housekeeping_interval: Duration,
        fetch_error_cooldown: Duration,
    ) -> Self {
        Self {
            engine,
            source,
            clock,
            metrics,
            poll_interval,
            housekeeping_interval,
            fetch_errors: ErrorThrottle::new(fetch_error_cooldown),
        }
    }

    /// Run both timers until `shutdown` flips to true.
    ///
    /// Ticks run one at a time; a tick that overruns its period swallows the
    /// missed ones instead of bursting.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut housekeeping = interval(self.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_secs = self.poll_interval.as_secs(),
            housekeeping_secs = self.housekeeping_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_once().await;
                }
                _ = housekeeping.tick() => {
                    self.housekeeping_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Fetch, then evaluate under the engine lock. `None` when the fetch failed.
    pub async fn poll_once(&mut self) -> Option<TickReport> {
        let results = match self.source.fetch_results().await {
            Ok(results) => results,
            Err(e) => {
                self.metrics.inc_fetch_failures();
                if let Some(suppressed) = self.fetch_errors.check(FETCH_ERROR_KEY) {
                    warn!(suppressed, "Result fetch failed: {}", e);
                }
                return None;
            }
        };

        let now = self.clock.now();
        let mut engine = self.engine.lock().await;
        Some(engine.evaluate(&results, &now).await)
    }

    pub async fn housekeeping_once(&mut self) -> HousekeepingReport {
        let now = self.clock.now();
        let mut engine = self.engine.lock().await;
        let report = engine.run_housekeeping(&now).await;
        if report.rolled_over {
            info!("{}", self.metrics.summary());
        }
        report
    }
}
