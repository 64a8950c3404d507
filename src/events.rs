//! Ingestion status channel.
//!
//! The scheduler reports progress through a [`StatusHandle`] that is created
//! in `main` and handed to both the scheduler and the read API. Internally it
//! is a `tokio::sync::watch` channel holding the latest [`IngestStatus`], so
//! readers always see the most recent snapshot and never block the pass.
//!
//! # Events
//!
//! | Call | Effect on the snapshot |
//! |------|------------------------|
//! | [`StatusHandle::pass_started`] | state `running`, fresh `current` report |
//! | [`StatusHandle::site_finished`] | site appended to `current`, totals updated |
//! | [`StatusHandle::pass_finished`] | state `idle`, `current` moved to `last` |
//!
//! A pass that dies part way still moves its partial report to `last`, so
//! the counters reported before the failure stay visible.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::models::{PassReport, SiteReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassState {
    #[default]
    Idle,
    Running,
}

/// Snapshot of the ingestion side, as served by `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatus {
    pub state: PassState,
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub triggers_dropped: u64,
    /// The pass in flight, if any.
    pub current: Option<PassReport>,
    /// The most recent finished (or failed) pass.
    pub last: Option<PassReport>,
}

#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<IngestStatus>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IngestStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> IngestStatus {
        self.tx.borrow().clone()
    }

    pub fn pass_started(&self, started_at: DateTime<Utc>) {
        self.tx.send_modify(|status| {
            status.state = PassState::Running;
            status.passes_started += 1;
            status.current = Some(PassReport::begin(started_at));
        });
    }

    pub fn site_finished(&self, site: SiteReport) {
        self.tx.send_modify(|status| {
            if let Some(current) = status.current.as_mut() {
                current.record(site);
            }
        });
    }

    pub fn trigger_dropped(&self) {
        self.tx.send_modify(|status| status.triggers_dropped += 1);
    }

    /// Close the current pass and return its report.
    pub fn pass_finished(&self, failed: bool) -> PassReport {
        let now = Utc::now();
        let mut report = PassReport::begin(now);
        self.tx.send_modify(|status| {
            status.state = PassState::Idle;
            if failed {
                status.passes_failed += 1;
            } else {
                status.passes_completed += 1;
            }
            if let Some(current) = status.current.take() {
                report = current;
            }
            report.finished_at = Some(now);
            status.last = Some(report.clone());
        });

        info!(
            failed,
            sites = report.sites.len(),
            processed = report.totals.processed,
            added = report.totals.added,
            skipped = report.totals.skipped,
            "Ingestion pass finished"
        );
        report
    }
}
