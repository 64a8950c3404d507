//! Deterministic keyword-scoring categorizer.
//!
//! Text and extracted keywords are lower-cased into one corpus. Each
//! category scores one point per trigger term found as a substring of that
//! corpus. The highest score wins; on a tie the category listed first in the
//! table wins. A best score of zero leaves the text unclassified (`""`).

use crate::config::CategoryTable;

pub fn categorize(table: &CategoryTable, text: &str, keywords: &[String]) -> String {
    let mut corpus = text.to_lowercase();
    for keyword in keywords {
        corpus.push(' ');
        corpus.push_str(&keyword.to_lowercase());
    }

    let mut best: Option<(&str, usize)> = None;
    for category in table.iter() {
        let score = category
            .terms
            .iter()
            .filter(|term| corpus.contains(term.to_lowercase().as_str()))
            .count();
        // Strictly greater: an equal score never displaces an earlier category.
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((category.label.as_str(), score));
        }
    }

    best.map(|(label, _)| label.to_string()).unwrap_or_default()
}
