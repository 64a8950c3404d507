//! Enrichment: summary, keywords and category for a page's text.
//!
//! Summarization and keyword extraction sit behind the [`Summarizer`] and
//! [`KeywordExtractor`] traits. Their failures never leave this module: a
//! failed summary becomes an empty string, failed keywords become an empty
//! list, and the page is still stored.
//!
//! Categorization is deterministic and lives in [`categorize`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::config::CategoryTable;
use crate::models::Enrichment;

pub mod categorize;
pub mod keywords;
pub mod summarize;

pub use categorize::categorize;
pub use keywords::FrequencyKeywords;
pub use summarize::FrequencySummarizer;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("no usable sentences in text")]
    NoSentences,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, EnrichError>;
}

#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, EnrichError>;
}

/// Runs both collaborators and the categorizer over one text.
pub struct Enricher {
    summarizer: Arc<dyn Summarizer>,
    keywords: Arc<dyn KeywordExtractor>,
    categories: Arc<CategoryTable>,
}

impl Enricher {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        keywords: Arc<dyn KeywordExtractor>,
        categories: Arc<CategoryTable>,
    ) -> Self {
        Self {
            summarizer,
            keywords,
            categories,
        }
    }

    /// Derive summary, keywords and category from `text`.
    ///
    /// `explicit_category` is used verbatim when given; otherwise the
    /// categorizer picks one from the text and the extracted keywords.
    /// Blank text short-circuits to an empty result without calling out.
    #[instrument(level = "debug", skip_all, fields(chars = text.chars().count()))]
    pub async fn enrich(&self, text: &str, explicit_category: Option<&str>) -> Enrichment {
        if text.trim().is_empty() {
            warn!("Enrichment received empty text");
            return Enrichment::default();
        }

        let summary = match self.summarizer.summarize(text).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Summarization failed; leaving summary empty");
                String::new()
            }
        };

        let keywords = match self.keywords.extract_keywords(text).await {
            Ok(keywords) => keywords,
            Err(e) => {
                error!(error = %e, "Keyword extraction failed; leaving keywords empty");
                Vec::new()
            }
        };

        let category = match explicit_category {
            Some(category) => category.to_string(),
            None => categorize(&self.categories, text, &keywords),
        };

        debug!(
            summary_chars = summary.chars().count(),
            keywords = keywords.len(),
            %category,
            "Enriched text"
        );
        Enrichment {
            summary,
            keywords,
            category,
        }
    }
}
