//! Interval scheduler for ingestion passes.
//!
//! [`Scheduler::start`] runs one pass right away, then polls on a fixed tick
//! and starts another pass whenever the configured interval has elapsed.
//!
//! # States
//!
//! The scheduler is either idle or running exactly one pass. A trigger that
//! arrives while a pass is in flight is dropped, never queued: the loop only
//! ever schedules the next due time after the current one, and
//! [`Scheduler::trigger`] refuses to start a second pass concurrently.
//!
//! A panic while crawling one site is contained by the crawler and recorded
//! on that site's report; the pass moves on to the next site. Each pass also
//! runs in its own tokio task, so anything that still escapes is reported as
//! a failed pass and the loop keeps going.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::crawler::Crawler;
use crate::events::StatusHandle;
use crate::models::PassReport;

/// How a single trigger ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed(PassReport),
    /// The pass died; the report holds whatever sites finished first.
    Failed(PassReport),
    /// Another pass was still running.
    Dropped,
}

/// Resets the running flag however the trigger future ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    crawler: Arc<Crawler>,
    config: Arc<AppConfig>,
    status: StatusHandle,
    interval: Duration,
    poll: Duration,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        crawler: Arc<Crawler>,
        config: Arc<AppConfig>,
        status: StatusHandle,
        interval: Duration,
        poll: Duration,
    ) -> Self {
        Self {
            crawler,
            config,
            status,
            interval,
            poll,
            running: AtomicBool::new(false),
        }
    }

    /// Run a pass now, then one every `interval` for as long as the task lives.
    pub async fn start(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            poll_secs = self.poll.as_secs(),
            "Scheduling ingestion passes"
        );

        let mut fired_at = Instant::now();
        info!("Running initial ingestion pass");
        self.trigger().await;
        info!("Initial ingestion pass done; entering scheduler loop");

        let mut next_due = self.advance(fired_at, Instant::now());
        let mut ticker = time::interval_at(Instant::now() + self.poll, self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if Instant::now() < next_due {
                continue;
            }
            fired_at = next_due;
            self.trigger().await;
            next_due = self.advance(fired_at, Instant::now());
        }
    }

    /// Next due time after a trigger at `fired_at`, given the pass ended at
    /// `now`. Due times that passed while the pass was running are dropped.
    fn advance(&self, fired_at: Instant, now: Instant) -> Instant {
        let (next, dropped) = next_due(fired_at, self.interval, now);
        if dropped > 0 {
            warn!(dropped, "Pass overran its interval; missed triggers dropped");
            for _ in 0..dropped {
                self.status.trigger_dropped();
            }
        }
        next
    }

    /// Start one pass unless one is already running.
    #[instrument(level = "info", skip(self))]
    pub async fn trigger(&self) -> TriggerOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous pass still running; dropping trigger");
            self.status.trigger_dropped();
            return TriggerOutcome::Dropped;
        }
        let _guard = RunningGuard(&self.running);

        self.status.pass_started(Utc::now());
        info!(sites = self.config.sites.len(), "Starting ingestion pass");

        let pass = tokio::spawn(run_pass(
            Arc::clone(&self.crawler),
            Arc::clone(&self.config),
            self.status.clone(),
        ));

        match pass.await {
            Ok(()) => TriggerOutcome::Completed(self.status.pass_finished(false)),
            Err(e) => {
                error!(error = %e, "Ingestion pass aborted");
                TriggerOutcome::Failed(self.status.pass_finished(true))
            }
        }
    }
}

/// Crawl every configured site, one after another, reporting each as it
/// finishes.
async fn run_pass(crawler: Arc<Crawler>, config: Arc<AppConfig>, status: StatusHandle) {
    let crawler = &*crawler;
    stream::iter(config.sites.iter())
        .then(move |site| crawler.crawl_site(site))
        .for_each(|report| {
            status.site_finished(report);
            future::ready(())
        })
        .await;
}

/// Returns the first due time after `fired_at` that is still ahead of `now`,
/// and how many due times were skipped to get there.
fn next_due(fired_at: Instant, interval: Duration, now: Instant) -> (Instant, u64) {
    let mut due = fired_at + interval;
    let mut dropped = 0;
    while due <= now {
        due += interval;
        dropped += 1;
    }
    (due, dropped)
}
