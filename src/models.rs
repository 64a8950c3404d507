//! Data models for ingested pages and their persisted representation.
//!
//! This module defines the records that flow through the pipeline:
//! - [`ExtractedFields`]: fields recovered from a page by the extractor
//! - [`Enrichment`]: summary, keywords and category derived from page text
//! - [`NewBriefing`]: a record ready to be inserted
//! - [`Briefing`]: a persisted record as served by the read API
//! - [`CrawlCounters`], [`SiteReport`], [`PassReport`]: run bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Fields the extractor recovered from one page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub publication_date: Option<String>,
    /// Trimmed paragraph texts under the content area, newline-joined.
    pub cleaned_text: Option<String>,
}

/// Output of the enrichment step. `category` is empty when unclassified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enrichment {
    pub summary: String,
    pub keywords: Vec<String>,
    pub category: String,
}

/// A briefing that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBriefing {
    pub title: String,
    pub source_url: String,
    pub publication_date: Option<String>,
    pub raw_content: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub source_site: String,
    pub category: String,
}

/// A persisted briefing. `id` and `scraped_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Briefing {
    pub id: i64,
    pub title: String,
    pub source_url: String,
    pub publication_date: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub raw_content: Option<String>,
    pub summary: String,
    pub keywords: Vec<String>,
    pub source_site: String,
    pub category: String,
}

/// Per-site (or per-pass) ingestion counters.
///
/// `processed` counts URLs that were not already stored and were therefore
/// attempted; `skipped` counts known URLs plus every attempt that did not
/// produce a new row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCounters {
    pub processed: u64,
    pub added: u64,
    pub skipped: u64,
}

impl AddAssign for CrawlCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.added += rhs.added;
        self.skipped += rhs.skipped;
    }
}

/// Result of crawling one site. `error` is set when the site aborted early;
/// the counters still hold whatever was accumulated before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteReport {
    pub site: String,
    pub counters: CrawlCounters,
    pub error: Option<String>,
}

/// Aggregate of one pass over all configured sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sites: Vec<SiteReport>,
    pub totals: CrawlCounters,
}

impl PassReport {
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            sites: Vec::new(),
            totals: CrawlCounters::default(),
        }
    }

    pub fn record(&mut self, site: SiteReport) {
        self.totals += site.counters;
        self.sites.push(site);
    }
}
