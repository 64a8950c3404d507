//! Per-site crawl orchestration.
//!
//! For one [`SiteConfig`] the crawler walks the start URLs in order. Each
//! URL that is not already stored is fetched, its fields extracted, its text
//! enriched and the result inserted. Links found on each start page are
//! filtered (allowed host, optional article pattern, not yet visited) and
//! processed the same way, one level deep.
//!
//! # Bounds
//!
//! A visited set shared by all start URLs of a site stops link discovery once
//! it holds `link_cap` URLs. Sites and URLs are processed strictly one at a
//! time.
//!
//! # Failure handling
//!
//! | Failure | Handled at | Effect |
//! |---------|------------|--------|
//! | Malformed URL or fetch error | URL | counted as skipped, next URL |
//! | No title recovered | URL | counted as skipped, links still followed |
//! | Duplicate or failed insert | URL | counted as skipped |
//! | Panic while crawling | site | site aborted, counters so far reported, next site |

use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::enrich::Enricher;
use crate::extract::extract;
use crate::fetch::{FetchError, FetchedPage, PageFetcher};
use crate::models::{CrawlCounters, ExtractedFields, NewBriefing, SiteReport};
use crate::store::BriefingStore;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("site crawl panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What happened to a page that was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Added,
    Rejected,
    Untitled,
}

/// Returns true when a discovered link may be crawled for `site`.
pub fn accepts_link(site: &SiteConfig, link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    url.host_str().is_some_and(|host| site.allows_host(host)) && site.matches_pattern(link)
}

/// Text handed to enrichment: the rendered page text, else the cleaned
/// article paragraphs, else nothing.
fn enrichment_text<'a>(page: &'a FetchedPage, fields: &'a ExtractedFields) -> &'a str {
    if !page.text.trim().is_empty() {
        &page.text
    } else {
        fields.cleaned_text.as_deref().unwrap_or_default()
    }
}

pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    enricher: Arc<Enricher>,
    store: BriefingStore,
    link_cap: usize,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        enricher: Arc<Enricher>,
        store: BriefingStore,
        link_cap: usize,
    ) -> Self {
        Self {
            fetcher,
            enricher,
            store,
            link_cap,
        }
    }

    /// Crawl one site. Never fails: a site-level error is logged and
    /// recorded on the report next to the counters gathered before it.
    #[instrument(level = "info", skip_all, fields(site = %site.key))]
    pub async fn crawl_site(&self, site: &SiteConfig) -> SiteReport {
        info!("Starting site crawl");
        let mut counters = CrawlCounters::default();

        let crawled = AssertUnwindSafe(self.crawl_site_inner(site, &mut counters))
            .catch_unwind()
            .await
            .map_err(|payload| CrawlError::Panicked(panic_message(payload.as_ref())));

        let error = match crawled {
            Ok(()) => {
                info!(
                    processed = counters.processed,
                    added = counters.added,
                    skipped = counters.skipped,
                    "Site crawl complete"
                );
                None
            }
            Err(e) => {
                error!(
                    error = %e,
                    processed = counters.processed,
                    added = counters.added,
                    skipped = counters.skipped,
                    "Site crawl aborted"
                );
                Some(e.to_string())
            }
        };

        SiteReport {
            site: site.key.clone(),
            counters,
            error,
        }
    }

    async fn crawl_site_inner(&self, site: &SiteConfig, counters: &mut CrawlCounters) {
        let mut visited: HashSet<String> = HashSet::new();
        for start in &site.start_urls {
            let page = self
                .visit(site, start, site.revisit_start_urls, counters)
                .await;
            visited.insert(start.clone());

            let Some(page) = page else {
                continue;
            };
            for link in &page.links {
                if visited.len() >= self.link_cap {
                    debug!(cap = self.link_cap, %start, "Visited cap reached; stopping discovery");
                    break;
                }
                if visited.contains(link) || !accepts_link(site, link) {
                    continue;
                }
                self.visit(site, link, false, counters).await;
                visited.insert(link.clone());
            }
        }
    }

    /// Check, fetch and ingest one URL, updating `counters`.
    ///
    /// Returns the fetched page so the caller can follow its links, or
    /// `None` when nothing was fetched. A stored URL is only fetched when
    /// `fetch_if_known` is set, and is then used for discovery alone.
    async fn visit(
        &self,
        site: &SiteConfig,
        url: &str,
        fetch_if_known: bool,
        counters: &mut CrawlCounters,
    ) -> Option<FetchedPage> {
        if self.store.exists(url).await {
            counters.skipped += 1;
            debug!(%url, "Already stored; skipping");
            if !fetch_if_known {
                return None;
            }
            return match self.fetcher.fetch(url).await {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!(%url, error = %e, "Fetch for link discovery failed");
                    None
                }
            };
        }

        counters.processed += 1;
        match self.ingest(site, url).await {
            Ok((page, outcome)) => {
                match outcome {
                    PageOutcome::Added => counters.added += 1,
                    PageOutcome::Rejected | PageOutcome::Untitled => counters.skipped += 1,
                }
                Some(page)
            }
            Err(e) => {
                warn!(%url, error = %e, "Page fetch failed; skipping");
                counters.skipped += 1;
                None
            }
        }
    }

    #[instrument(level = "debug", skip(self, site))]
    async fn ingest(
        &self,
        site: &SiteConfig,
        url: &str,
    ) -> Result<(FetchedPage, PageOutcome), FetchError> {
        let page = self.fetcher.fetch(url).await?;
        let fields = extract(&page.html, &site.selectors);

        let Some(title) = fields.title.clone() else {
            warn!(%url, "No title recovered; skipping");
            return Ok((page, PageOutcome::Untitled));
        };

        let enrichment = self
            .enricher
            .enrich(enrichment_text(&page, &fields), None)
            .await;

        let record = NewBriefing {
            title,
            source_url: url.to_string(),
            publication_date: fields.publication_date,
            raw_content: page.html.clone(),
            summary: enrichment.summary,
            keywords: enrichment.keywords,
            source_site: site.key.clone(),
            category: enrichment.category,
        };

        let outcome = if self.store.insert(&record).await {
            PageOutcome::Added
        } else {
            PageOutcome::Rejected
        };
        Ok((page, outcome))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Category, CategoryTable, Selectors};
    use crate::enrich::{FrequencyKeywords, FrequencySummarizer};
    use crate::store::BriefingQuery;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages and records every URL it was asked for.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pages: HashMap<String, FetchedPage>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn page(mut self, url: &str, title: Option<&str>, links: &[&str]) -> Self {
            let html = match title {
                Some(title) => format!(
                    "<html><body><h1>{title}</h1><time datetime=\"2025-03-01\">March</time>\
                     <article><p>Corn starch output rose sharply.</p><p>Glucose demand held.</p></article>\
                     </body></html>"
                ),
                None => "<html><body><p>No heading here.</p></body></html>".to_string(),
            };
            self.pages.insert(
                url.to_string(),
                FetchedPage {
                    url: url.to_string(),
                    html,
                    links: links.iter().map(|l| l.to_string()).collect(),
                    text: String::new(),
                },
            );
            self
        }

        pub(crate) fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    /// Panics for one URL, delegates everything else.
    pub(crate) struct PanickingFetcher {
        pub(crate) poison: &'static str,
        pub(crate) inner: FakeFetcher,
    }

    #[async_trait]
    impl PageFetcher for PanickingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            if url == self.poison {
                panic!("renderer crashed on {url}");
            }
            self.inner.fetch(url).await
        }
    }

    pub(crate) fn site(key: &str, start_urls: &[&str], pattern: Option<&str>) -> SiteConfig {
        SiteConfig {
            key: key.to_string(),
            allowed_domains: vec!["example.com".to_string()],
            start_urls: start_urls.iter().map(|u| u.to_string()).collect(),
            article_url_pattern: pattern.map(String::from),
            selectors: Selectors {
                title: "h1".into(),
                date: "time".into(),
                content_area: "article".into(),
            },
            notes: String::new(),
            revisit_start_urls: false,
        }
    }

    pub(crate) fn enricher() -> Arc<Enricher> {
        let table = CategoryTable::new(vec![Category {
            label: "corn".into(),
            terms: vec!["corn".into(), "glucose".into()],
        }]);
        Arc::new(Enricher::new(
            Arc::new(FrequencySummarizer::new(5)),
            Arc::new(FrequencyKeywords::new(10)),
            Arc::new(table),
        ))
    }

    fn crawler(fetcher: Arc<FakeFetcher>, store: BriefingStore, cap: usize) -> Crawler {
        Crawler::new(fetcher, enricher(), store, cap)
    }

    fn counters(processed: u64, added: u64, skipped: u64) -> CrawlCounters {
        CrawlCounters {
            processed,
            added,
            skipped,
        }
    }

    #[tokio::test]
    async fn test_start_page_and_matching_article_are_stored() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(
                    "https://example.com/news",
                    Some("Title A"),
                    &[
                        "https://example.com/article/1",
                        "https://example.com/other/2",
                        "https://external.com/article/1",
                    ],
                )
                .page("https://example.com/article/1", Some("Title B"), &[]),
        );
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = crawler(fetcher.clone(), store.clone(), 10);

        let report = crawler
            .crawl_site(&site("example", &["https://example.com/news"], Some("/article/")))
            .await;

        assert_eq!(report.counters, counters(2, 2, 0));
        assert_eq!(report.error, None);
        assert_eq!(
            fetcher.requested(),
            vec!["https://example.com/news", "https://example.com/article/1"]
        );

        let stored = store.query(&BriefingQuery::latest(10)).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].title, "Title B");
        assert_eq!(stored[0].source_site, "example");
        assert_eq!(stored[0].category, "corn");
        assert_eq!(stored[0].publication_date.as_deref(), Some("2025-03-01"));
        assert!(!stored[0].summary.is_empty());
    }

    #[tokio::test]
    async fn test_known_urls_are_not_fetched_again() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page("https://example.com/news", Some("Title A"), &["https://example.com/article/1"])
                .page("https://example.com/article/1", Some("Title B"), &[]),
        );
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = crawler(fetcher.clone(), store.clone(), 10);
        let site = site("example", &["https://example.com/news"], None);

        crawler.crawl_site(&site).await;
        let second = crawler.crawl_site(&site).await;

        assert_eq!(second.counters, counters(0, 0, 1));
        assert_eq!(fetcher.requested().len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_revisit_start_urls_discovers_new_links() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page("https://example.com/news", Some("Listing"), &["https://example.com/article/1"])
                .page("https://example.com/article/1", Some("Title B"), &[]),
        );
        let store = BriefingStore::in_memory().await.unwrap();
        store
            .insert(&NewBriefing {
                title: "Listing".into(),
                source_url: "https://example.com/news".into(),
                publication_date: None,
                raw_content: String::new(),
                summary: String::new(),
                keywords: vec![],
                source_site: "example".into(),
                category: String::new(),
            })
            .await;
        let crawler = crawler(fetcher.clone(), store.clone(), 10);
        let mut site = site("example", &["https://example.com/news"], None);
        site.revisit_start_urls = true;

        let report = crawler.crawl_site(&site).await;
        assert_eq!(report.counters, counters(1, 1, 1));
        assert!(store.exists("https://example.com/article/1").await);
    }

    #[tokio::test]
    async fn test_untitled_page_is_skipped_but_links_followed() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page("https://example.com/news", None, &["https://example.com/article/1"])
                .page("https://example.com/article/1", Some("Title B"), &[]),
        );
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = crawler(fetcher, store.clone(), 10);

        let report = crawler
            .crawl_site(&site("example", &["https://example.com/news"], None))
            .await;
        assert_eq!(report.counters, counters(2, 1, 1));
        assert!(!store.exists("https://example.com/news").await);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_skipped_and_crawl_continues() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(
                    "https://example.com/news",
                    Some("Title A"),
                    &["https://example.com/missing", "https://example.com/article/1"],
                )
                .page("https://example.com/article/1", Some("Title B"), &[]),
        );
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = crawler(fetcher, store, 10);

        let report = crawler
            .crawl_site(&site(
                "example",
                &["https://example.com/gone", "https://example.com/news"],
                None,
            ))
            .await;
        assert_eq!(report.counters, counters(4, 2, 2));
        assert_eq!(report.error, None);
    }

    #[tokio::test]
    async fn test_visited_cap_is_shared_across_start_urls() {
        let links: Vec<String> = (0..20)
            .map(|i| format!("https://example.com/article/{i}"))
            .collect();
        let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let mut fake = FakeFetcher::default()
            .page("https://example.com/a", Some("A"), &link_refs)
            .page("https://example.com/b", Some("B"), &link_refs);
        for link in &links {
            fake = fake.page(link, Some("Article"), &[]);
        }
        let fetcher = Arc::new(fake);
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = crawler(fetcher.clone(), store.clone(), 4);

        crawler
            .crawl_site(&site(
                "example",
                &["https://example.com/a", "https://example.com/b"],
                None,
            ))
            .await;

        // a + three links fill the cap; b is still visited but finds no room.
        assert_eq!(
            fetcher.requested(),
            vec![
                "https://example.com/a",
                "https://example.com/article/0",
                "https://example.com/article/1",
                "https://example.com/article/2",
                "https://example.com/b",
            ]
        );
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_malformed_start_url_is_skipped_and_siblings_crawled() {
        let fetcher = Arc::new(FakeFetcher::default().page("https://example.com/a", Some("A"), &[]));
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = crawler(fetcher.clone(), store.clone(), 10);

        let report = crawler
            .crawl_site(&site("mixed", &["not a url", "https://example.com/a"], None))
            .await;
        assert_eq!(report.error, None);
        assert_eq!(report.counters, counters(2, 1, 1));
        assert!(fetcher.requested().contains(&"https://example.com/a".to_string()));
        assert!(store.exists("https://example.com/a").await);
    }

    #[tokio::test]
    async fn test_panic_is_contained_at_site_boundary() {
        let fetcher = Arc::new(PanickingFetcher {
            poison: "https://example.com/b",
            inner: FakeFetcher::default().page("https://example.com/a", Some("A"), &[]),
        });
        let store = BriefingStore::in_memory().await.unwrap();
        let crawler = Crawler::new(fetcher, enricher(), store.clone(), 10);

        let report = crawler
            .crawl_site(&site(
                "first",
                &["https://example.com/a", "https://example.com/b"],
                None,
            ))
            .await;
        assert!(report.error.unwrap().contains("renderer crashed"));
        // Progress made before the panic is kept.
        assert_eq!(report.counters.added, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn test_link_filtering() {
        let site = site("example", &["https://example.com/news"], Some("/article/"));
        assert!(accepts_link(&site, "https://example.com/article/1"));
        assert!(accepts_link(&site, "https://www.example.com/article/1"));
        assert!(!accepts_link(&site, "https://example.com/other/2"));
        assert!(!accepts_link(&site, "https://external.com/article/1"));
        assert!(!accepts_link(&site, "ftp://example.com/article/1"));
        assert!(!accepts_link(&site, "/article/1"));
    }
}
