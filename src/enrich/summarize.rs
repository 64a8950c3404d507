//! Extractive summarizer.
//!
//! Sentences are scored by how many frequent content terms they contain,
//! the best `sentences` are kept, and they are emitted in their original
//! order joined by a space. Texts shorter than the target come back whole.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::keywords::terms;
use super::{EnrichError, Summarizer};

static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?。！？\n]+[.!?。！？]*").expect("static sentence regex"));

#[derive(Debug, Clone)]
pub struct FrequencySummarizer {
    sentences: usize,
}

impl FrequencySummarizer {
    pub fn new(sentences: usize) -> Self {
        Self { sentences }
    }
}

#[async_trait]
impl Summarizer for FrequencySummarizer {
    async fn summarize(&self, text: &str) -> Result<String, EnrichError> {
        let sentences: Vec<(&str, Vec<String>)> = SENTENCE
            .find_iter(text)
            .map(|m| m.as_str().trim())
            .map(|s| (s, terms(s)))
            .filter(|(_, t)| !t.is_empty())
            .collect();
        if sentences.is_empty() {
            return Err(EnrichError::NoSentences);
        }
        if sentences.len() <= self.sentences {
            return Ok(join(sentences.iter().map(|(s, _)| *s)));
        }

        let mut freq: HashMap<&str, f64> = HashMap::new();
        for term in sentences.iter().flat_map(|(_, t)| t) {
            *freq.entry(term.as_str()).or_default() += 1.0;
        }
        let max = freq.values().copied().fold(1.0, f64::max);

        let mut scored: Vec<(usize, f64)> = sentences
            .iter()
            .enumerate()
            .map(|(i, (_, t))| {
                let sum: f64 = t.iter().map(|term| freq[term.as_str()] / max).sum();
                (i, sum / (t.len() as f64).sqrt())
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut keep: Vec<usize> = scored
            .into_iter()
            .take(self.sentences)
            .map(|(i, _)| i)
            .collect();
        keep.sort_unstable();
        Ok(join(keep.into_iter().map(|i| sentences[i].0)))
    }
}

fn join<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}
