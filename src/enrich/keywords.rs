//! Frequency-based keyword extraction.
//!
//! Text is tokenised into lower-cased words; CJK runs (which carry no word
//! boundaries) are split into overlapping character bigrams. Stopwords,
//! numbers and very short Latin tokens are dropped, and the remaining terms
//! are ranked by frequency, ties broken by first appearance.

use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::{EnrichError, KeywordExtractor};
use crate::utils::is_cjk;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static word regex"));

pub(crate) const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "among", "and", "any", "are",
    "because", "been", "before", "being", "below", "between", "both", "but", "can", "could",
    "did", "does", "doing", "down", "during", "each", "few", "for", "from", "further", "had",
    "has", "have", "having", "her", "here", "hers", "him", "his", "how", "into", "its",
    "itself", "just", "more", "most", "much", "new", "not", "now", "off", "once", "only",
    "other", "our", "ours", "out", "over", "own", "said", "same", "says", "she", "should",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "then", "there",
    "these", "they", "this", "those", "through", "too", "under", "until", "very", "was",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours", "year", "years",
];

/// Split `text` into candidate terms, in document order.
pub(crate) fn terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in WORD.find_iter(text) {
        for (cjk, chunk) in &word.as_str().chars().chunk_by(|c| is_cjk(*c)) {
            let chars: Vec<char> = chunk.collect();
            if cjk {
                if chars.len() == 1 {
                    continue;
                }
                out.extend(chars.windows(2).map(|pair| pair.iter().collect::<String>()));
            } else {
                let token = chars.into_iter().collect::<String>().to_lowercase();
                if token.chars().count() >= 3
                    && !token.chars().all(|c| c.is_ascii_digit() || c == '_')
                    && !STOPWORDS.contains(&token.as_str())
                {
                    out.push(token);
                }
            }
        }
    }
    out
}

/// Returns the `count` most frequent terms of a text.
#[derive(Debug, Clone)]
pub struct FrequencyKeywords {
    count: usize,
}

impl FrequencyKeywords {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

#[async_trait]
impl KeywordExtractor for FrequencyKeywords {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, EnrichError> {
        let mut stats: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, term) in terms(text).into_iter().enumerate() {
            stats.entry(term).or_insert((0, position)).0 += 1;
        }

        Ok(stats
            .into_iter()
            .sorted_by(|(_, (freq_a, first_a)), (_, (freq_b, first_b))| {
                freq_b.cmp(freq_a).then(first_a.cmp(first_b))
            })
            .take(self.count)
            .map(|(term, _)| term)
            .collect())
    }
}
