//! SQLite persistence for briefings.
//!
//! The `source_url` column carries a UNIQUE constraint and that constraint is
//! the only authority on duplicates. [`BriefingStore::exists`] is a cheap
//! pre-check that lets the crawler skip a fetch; it is not a lock, and two
//! ingestion paths racing on the same URL are settled by the constraint when
//! the second insert is rejected.
//!
//! Every call checks a connection out of the pool for the duration of one
//! statement, so the read API and the scheduler never hold locks on each
//! other.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::models::{Briefing, NewBriefing};
use crate::utils::truncate_for_log;

/// Hard ceiling on the number of rows one query may return.
pub const MAX_QUERY_LIMIT: i64 = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt briefing row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Filters for [`BriefingStore::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BriefingQuery {
    pub limit: i64,
    /// Case-insensitive substring match against title, summary or keywords.
    pub keyword: Option<String>,
    /// Exact match on category.
    pub category: Option<String>,
}

impl BriefingQuery {
    pub fn latest(limit: i64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, FromRow)]
struct BriefingRow {
    id: i64,
    title: String,
    source_url: String,
    publication_date: Option<String>,
    scraped_at: String,
    raw_content: Option<String>,
    summary: Option<String>,
    keywords: String,
    source_site: String,
    category: String,
}

impl BriefingRow {
    fn into_briefing(self) -> Result<Briefing, StoreError> {
        let scraped_at = DateTime::parse_from_rfc3339(&self.scraped_at)
            .map_err(|e| StoreError::Corrupt {
                id: self.id,
                reason: format!("invalid scraped_at: {e}"),
            })?
            .with_timezone(&Utc);
        Ok(Briefing {
            id: self.id,
            title: self.title,
            source_url: self.source_url,
            publication_date: self.publication_date,
            scraped_at,
            raw_content: self.raw_content,
            summary: self.summary.unwrap_or_default(),
            keywords: decode_keywords(&self.keywords),
            source_site: self.source_site,
            category: self.category,
        })
    }
}

/// Keywords are stored as a JSON array; older comma-joined rows still decode.
fn decode_keywords(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect()
    })
}

/// Escape `LIKE` wildcards so user input only ever matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Handle to the briefing table. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct BriefingStore {
    pool: SqlitePool,
}

impl BriefingStore {
    /// Open (creating if needed) the database at `database_url` and make
    /// sure the schema exists.
    ///
    /// # Example URLs
    /// - `sqlite://briefings.db` - file next to the working directory
    /// - `sqlite::memory:` - ephemeral, see [`BriefingStore::in_memory`]
    #[instrument(level = "info")]
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Database initialised");
        Ok(store)
    }

    /// A private in-memory database. The pool is pinned to one connection
    /// that never expires, since each SQLite memory connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS briefings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                source_url TEXT NOT NULL UNIQUE,
                publication_date TEXT,
                scraped_at TEXT NOT NULL,
                raw_content TEXT,
                summary TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                source_site TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_briefings_scraped_at ON briefings(scraped_at);
            CREATE INDEX IF NOT EXISTS idx_briefings_category ON briefings(category);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether a briefing for `url` is already stored.
    ///
    /// Storage errors are logged and reported as `false`: a transient fault
    /// costs a redundant fetch, and the UNIQUE constraint still stops the
    /// duplicate row.
    #[instrument(level = "debug", skip(self))]
    pub async fn exists(&self, url: &str) -> bool {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM briefings WHERE source_url = ? LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await;

        match found {
            Ok(row) => row.is_some(),
            Err(e) => {
                error!(%url, error = %e, "Existence check failed; treating URL as unseen");
                false
            }
        }
    }

    /// Insert a new briefing. Returns `true` when a row was created and
    /// `false` when the URL was already present or the write failed.
    #[instrument(level = "debug", skip_all, fields(url = %record.source_url))]
    pub async fn insert(&self, record: &NewBriefing) -> bool {
        let keywords = match serde_json::to_string(&record.keywords) {
            Ok(keywords) => keywords,
            Err(e) => {
                error!(error = %e, "Failed to encode keywords");
                return false;
            }
        };
        let scraped_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let result = sqlx::query(
            r#"
            INSERT INTO briefings (
                title, source_url, publication_date, scraped_at, raw_content,
                summary, keywords, source_site, category
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.title)
        .bind(&record.source_url)
        .bind(&record.publication_date)
        .bind(&scraped_at)
        .bind(&record.raw_content)
        .bind(&record.summary)
        .bind(&keywords)
        .bind(&record.source_site)
        .bind(&record.category)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(title = %truncate_for_log(&record.title, 50), "Added briefing");
                true
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                warn!("Skipping duplicate briefing");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to insert briefing");
                false
            }
        }
    }

    /// Newest-first briefings matching `filter`. The limit is clamped to
    /// `0..=MAX_QUERY_LIMIT`.
    #[instrument(level = "debug", skip(self))]
    pub async fn query(&self, filter: &BriefingQuery) -> Result<Vec<Briefing>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, title, source_url, publication_date, scraped_at, raw_content, \
             summary, keywords, source_site, category FROM briefings",
        );

        let mut joiner = " WHERE ";
        if let Some(keyword) = &filter.keyword {
            let pattern = format!("%{}%", escape_like(keyword));
            qb.push(joiner);
            qb.push("(title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR summary LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR keywords LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
            joiner = " AND ";
        }
        if let Some(category) = &filter.category {
            qb.push(joiner);
            qb.push("category = ").push_bind(category.clone());
        }

        qb.push(" ORDER BY scraped_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.clamp(0, MAX_QUERY_LIMIT));

        let rows: Vec<BriefingRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(BriefingRow::into_briefing).collect()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM briefings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
