//! # Briefing Ingest
//!
//! A news briefing pipeline that periodically crawls a fixed set of news and
//! press sites, extracts article fields, enriches them with a summary,
//! keywords and a domain category, and serves the stored briefings through a
//! small JSON read API.
//!
//! ## Features
//!
//! - Bounded per-site crawl: allowed domains, article URL patterns and a
//!   shared cap on discovered links
//! - CSS-selector field extraction with graceful per-field fallback
//! - Frequency based summaries and keywords (Latin and CJK text)
//! - Deduplicated SQLite persistence keyed on source URL
//! - Read API: latest briefing, filtered listings, categories, ingest status
//!
//! ## Usage
//!
//! ```sh
//! briefing_ingest --config sites.yaml --interval-hours 8
//! ```
//!
//! ## Architecture
//!
//! Two long-lived tasks share the store and a status channel:
//! 1. **Scheduler**: one pass at startup, then one per interval; each pass
//!    crawls every site in order
//! 2. **Read API**: axum server answering queries until Ctrl-C

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod crawler;
mod enrich;
mod events;
mod extract;
mod fetch;
mod models;
mod scheduler;
mod store;
mod utils;

use api::AppState;
use cli::Cli;
use config::AppConfig;
use crawler::Crawler;
use enrich::{Enricher, FrequencyKeywords, FrequencySummarizer};
use events::StatusHandle;
use fetch::http::HttpFetcher;
use fetch::retry::RetryFetch;
use scheduler::{Scheduler, TriggerOutcome};
use store::BriefingStore;

/// Retries per page for transient fetch failures.
const FETCH_RETRIES: usize = 2;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "briefing_ingest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = Arc::new(AppConfig::load(args.config.as_deref()).await?);
    if config.categories.is_empty() {
        warn!("No categories configured; briefings will be stored uncategorized");
    }

    let store = match BriefingStore::connect(&args.database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!(url = %args.database_url, error = %e, "Failed to open briefing store");
            return Err(e.into());
        }
    };
    match store.count().await {
        Ok(stored) => info!(stored, "Briefing store ready"),
        Err(e) => warn!(error = %e, "Could not count stored briefings"),
    }

    let fetcher = RetryFetch::new(HttpFetcher::new()?, FETCH_RETRIES, Duration::from_secs(1));
    let categories = Arc::new(config.categories.clone());
    let enricher = Arc::new(Enricher::new(
        Arc::new(FrequencySummarizer::new(args.summary_sentences)),
        Arc::new(FrequencyKeywords::new(args.keyword_count)),
        Arc::clone(&categories),
    ));
    let crawler = Arc::new(Crawler::new(
        Arc::new(fetcher),
        enricher,
        store.clone(),
        config.link_cap,
    ));

    let status = StatusHandle::new();
    let scheduler = Arc::new(Scheduler::new(
        crawler,
        Arc::clone(&config),
        status.clone(),
        args.interval(),
        args.poll(),
    ));

    if args.once {
        return match scheduler.trigger().await {
            TriggerOutcome::Completed(report) => {
                info!(
                    processed = report.totals.processed,
                    added = report.totals.added,
                    skipped = report.totals.skipped,
                    "Single pass complete"
                );
                Ok(())
            }
            TriggerOutcome::Failed(_) => Err("ingestion pass failed".into()),
            TriggerOutcome::Dropped => Err("ingestion pass already running".into()),
        };
    }

    let ingest = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.start().await }
    });

    let state = AppState {
        store,
        categories,
        status,
    };
    let served = api::serve(args.bind, state).await;

    ingest.abort();
    info!("Scheduler stopped");
    served?;
    Ok(())
}
