//! Static crawl configuration: sites, selectors and category tables.
//!
//! Configuration is read once at startup from YAML (either a user supplied
//! file or the bundled `config/default.yaml`), validated, and then shared
//! behind an `Arc` for the lifetime of the process. Nothing mutates it after
//! [`AppConfig::load`] returns.
//!
//! Site order and category order are both preserved exactly as written in
//! the file. Sites are crawled in that order, and the categorizer breaks
//! score ties by category order.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};
use url::Url;

use crate::utils::host_matches;

/// Configuration compiled into the binary; used when no `--config` is given.
pub const BUNDLED_CONFIG: &str = include_str!("../config/default.yaml");

/// Default number of URLs a single site may visit during one pass.
pub const DEFAULT_LINK_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// CSS selectors used by the field extractor for one site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Selectors {
    pub title: String,
    pub date: String,
    pub content_area: String,
}

/// One crawl target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteConfig {
    /// Unique site key; stored on every briefing as `source_site`.
    pub key: String,
    /// Hostnames (and their subdomains) links may point at.
    pub allowed_domains: Vec<String>,
    /// Listing pages, processed in order.
    pub start_urls: Vec<String>,
    /// Substring a discovered link must contain. `None` accepts every link.
    pub article_url_pattern: Option<String>,
    pub selectors: Selectors,
    pub notes: String,
    /// Fetch already-stored start URLs anyway so their links can still be
    /// discovered. The page itself is never re-ingested.
    pub revisit_start_urls: bool,
}

impl SiteConfig {
    /// True when `host` is one of the allowed domains or a subdomain of one.
    pub fn allows_host(&self, host: &str) -> bool {
        self.allowed_domains
            .iter()
            .any(|domain| host_matches(host, domain))
    }

    /// True when no pattern is configured or `url` contains it.
    pub fn matches_pattern(&self, url: &str) -> bool {
        match &self.article_url_pattern {
            Some(pattern) => url.contains(pattern.as_str()),
            None => true,
        }
    }
}

/// Site body as written in YAML; the key comes from the enclosing mapping.
#[derive(Debug, Deserialize)]
struct SiteEntry {
    allowed_domains: Vec<String>,
    start_urls: Vec<String>,
    #[serde(default)]
    article_url_pattern: Option<String>,
    selectors: Selectors,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    revisit_start_urls: bool,
}

impl SiteEntry {
    fn into_site(self, key: String) -> SiteConfig {
        let start_urls = self
            .start_urls
            .into_iter()
            .map(|u| normalize_start_url(&key, u))
            .collect();
        SiteConfig {
            key,
            allowed_domains: self
                .allowed_domains
                .into_iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .collect(),
            start_urls,
            // An empty pattern would match everything anyway; normalise it away.
            article_url_pattern: self.article_url_pattern.filter(|p| !p.is_empty()),
            selectors: self.selectors,
            notes: self.notes,
            revisit_start_urls: self.revisit_start_urls,
        }
    }
}

/// Serialize a start URL the same way discovered links are, so both forms of
/// one address dedupe together. Unparseable URLs are kept as written and
/// skipped when crawled.
fn normalize_start_url(site: &str, raw: String) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(e) => {
            warn!(site, url = %raw, error = %e, "Start URL does not parse; it will be skipped");
            raw
        }
    }
}

/// A category label and the terms that vote for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Category {
    pub label: String,
    pub terms: Vec<String>,
}

/// Ordered category table. Iteration order is the tie-break order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CategoryTable(Vec<Category>);

impl CategoryTable {
    pub fn new(categories: Vec<Category>) -> Self {
        Self(categories)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Category> {
        self.0.iter()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(|c| c.label.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the ingestion pipeline needs to know about its targets.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_link_cap")]
    pub link_cap: usize,
    #[serde(deserialize_with = "ordered_sites")]
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub categories: CategoryTable,
}

fn default_link_cap() -> usize {
    DEFAULT_LINK_CAP
}

/// Deserialize the `sites` mapping into a `Vec`, keeping file order.
fn ordered_sites<'de, D>(deserializer: D) -> Result<Vec<SiteConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SitesVisitor;

    impl<'de> Visitor<'de> for SitesVisitor {
        type Value = Vec<SiteConfig>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of site key to site configuration")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut sites = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, entry)) = map.next_entry::<String, SiteEntry>()? {
                sites.push(entry.into_site(key));
            }
            Ok(sites)
        }
    }

    deserializer.deserialize_map(SitesVisitor)
}

impl AppConfig {
    /// Load from `path`, or from the bundled defaults when `path` is `None`.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_yaml(&raw)?
            }
            None => Self::bundled()?,
        };
        info!(
            sites = config.sites.len(),
            categories = config.categories.labels().len(),
            link_cap = config.link_cap,
            "Loaded crawl configuration"
        );
        Ok(config)
    }

    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_yaml(BUNDLED_CONFIG)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.link_cap == 0 {
            return Err(ConfigError::Invalid("link_cap must be at least 1".into()));
        }

        let mut keys = HashSet::new();
        for site in &self.sites {
            if site.key.trim().is_empty() {
                return Err(ConfigError::Invalid("site key must not be empty".into()));
            }
            if !keys.insert(site.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate site key '{}'",
                    site.key
                )));
            }
            if site.allowed_domains.iter().all(|d| d.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "site '{}' has no allowed domains",
                    site.key
                )));
            }
            if site.start_urls.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "site '{}' has no start URLs",
                    site.key
                )));
            }
        }

        let mut labels = HashSet::new();
        for category in self.categories.iter() {
            if !labels.insert(category.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate category '{}'",
                    category.label
                )));
            }
        }
        Ok(())
    }
}
