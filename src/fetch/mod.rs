//! Page fetching for the crawler.
//!
//! The crawler only depends on the [`PageFetcher`] trait: give it a URL, get
//! back the raw markup, the links found on the page and a plain-text
//! rendering. The default implementation is [`http::HttpFetcher`], usually
//! wrapped in [`retry::RetryFetch`] for transient failures.
//!
//! # Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`http`] | `reqwest` based fetcher |
//! | [`retry`] | Exponential backoff decorator for any fetcher |
//!
//! Link and text extraction live here in [`parse_page`] so every fetcher
//! produces pages the same way.

use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

pub mod http;
pub mod retry;

static ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static anchor selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static body selector"));

/// Elements whose text never shows up in the plain-text rendering.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Timeouts, connection failures and 5xx responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// A fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    /// The URL that was requested.
    pub url: String,
    pub html: String,
    /// Absolute http(s) links in document order, fragments stripped, no repeats.
    pub links: Vec<String>,
    /// Visible body text, one text node per line.
    pub text: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Build a [`FetchedPage`] from markup served at `base`.
///
/// `requested` is recorded as the page URL; relative links are resolved
/// against `base`, which may differ after redirects.
pub fn parse_page(requested: &str, base: &Url, html: String) -> FetchedPage {
    let document = Html::parse_document(&html);

    let links = document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|link| matches!(link.scheme(), "http" | "https"))
        .map(|mut link| {
            link.set_fragment(None);
            link.to_string()
        })
        .unique()
        .collect();

    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());
    let text = root
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
            });
            let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!hidden && !line.is_empty()).then_some(line)
        })
        .collect::<Vec<_>>()
        .join("\n");

    FetchedPage {
        url: requested.to_string(),
        html,
        links,
        text,
    }
}
