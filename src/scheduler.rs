//! Interval-based scheduler driving checks for all non-paused targets.
//!
//! Scheduling state is a due-time map held in memory; a fresh start treats
//! every target as immediately due. Targets within a tick are checked
//! sequentially so each target's check-then-persist sequence stays atomic.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::checker::Checker;
use crate::notify::{self, Event};
use crate::store::Store;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct Scheduler {
    pub poll_interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl Scheduler {
    /// Run until the shutdown signal fires. Each tick checks every
    /// non-paused target whose interval has elapsed, persists the result
    /// (and a snapshot when content changed), and dispatches notifications
    /// for down/changed/error outcomes.
    pub async fn run(&self, store: &Store, checker: &Checker, mut shutdown: watch::Receiver<bool>) {
        let mut last_check: HashMap<i64, Instant> = HashMap::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        log::info!("scheduler started (poll every {:?})", self.poll_interval);
        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    log::info!("scheduler stopped");
                    break;
                }

                _ = ticker.tick() => {
                    self.tick(store, checker, &mut last_check).await;
                }
            }
        }
    }

    async fn tick(
        &self,
        store: &Store,
        checker: &Checker,
        last_check: &mut HashMap<i64, Instant>,
    ) {
        let targets = match store.list_targets() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("failed to list targets: {e}");
                return;
            }
        };

        let now = Instant::now();
        for target in targets {
            if target.paused {
                continue;
            }
            if let Some(last) = last_check.get(&target.id) {
                if now.duration_since(*last) < Duration::from_secs(target.interval) {
                    continue;
                }
            }

            let outcome = checker.check(store, &target).await;
            last_check.insert(target.id, now);

            if let Err(e) = store.persist_outcome(&target, &outcome) {
                log::warn!("failed to persist result for '{}': {e}", target.name);
            }

            log::info!(
                "{} — {} [{}ms]",
                target.name,
                outcome.status,
                outcome.response_time.as_millis()
            );

            if outcome.status.is_alertable() {
                let event = Event::from_check(&target, &outcome);
                notify::dispatch(store, &event).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let checker = Checker::new(dir.path());
        let scheduler = Scheduler {
            poll_interval: Duration::from_millis(10),
        };

        let (tx, rx) = watch::channel(false);
        let run = scheduler.run(&store, &checker, rx);
        tokio::pin!(run);

        // Let a few empty ticks pass, then signal shutdown.
        tokio::select! {
            _ = &mut run => panic!("scheduler exited early"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("scheduler did not stop after shutdown signal");
    }
}
