//! HTTP page fetcher.
//!
//! Downloads a page with `reqwest` and hands the markup to
//! [`parse_page`](super::parse_page). Relative links are resolved against
//! the final URL after redirects, so listing pages that bounce to a
//! canonical host still yield usable absolute links.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use super::{FetchError, FetchedPage, PageFetcher, parse_page};

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; briefing_ingest/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Fetches pages over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher with a 30 second request timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await?;
        let page = parse_page(url, &final_url, html);

        info!(
            bytes = page.html.len(),
            links = page.links.len(),
            "Fetched page"
        );
        debug!(links = ?page.links, "Discovered links");
        Ok(page)
    }
}
