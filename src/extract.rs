//! Field extraction from raw page markup.
//!
//! Each field (title, publication date, cleaned text) is looked up with its
//! own selector and degrades on its own: a selector that fails to parse or
//! matches nothing yields `None` for that field and a warning, and the other
//! fields are still extracted. Whether a missing field makes the page
//! unusable is the caller's decision.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{instrument, warn};

use crate::config::Selectors;
use crate::models::ExtractedFields;

static PARAGRAPH: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("static paragraph selector"));

/// Extract title, publication date and cleaned text from `html`.
#[instrument(level = "debug", skip_all, fields(title_selector = %selectors.title))]
pub fn extract(html: &str, selectors: &Selectors) -> ExtractedFields {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title", &selectors.title)
        .map(element_text)
        .filter(|t| !t.is_empty());

    let publication_date = select_first(&document, "date", &selectors.date).and_then(|el| {
        // Prefer the machine-readable attribute when the page offers one.
        el.value()
            .attr("datetime")
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .or_else(|| Some(element_text(el)).filter(|t| !t.is_empty()))
    });

    let cleaned_text = select_first(&document, "content", &selectors.content_area).map(|area| {
        area.select(&PARAGRAPH)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    });

    ExtractedFields {
        title,
        publication_date,
        cleaned_text,
    }
}

fn select_first<'a>(document: &'a Html, field: &'static str, css: &str) -> Option<ElementRef<'a>> {
    let selector = match Selector::parse(css) {
        Ok(selector) => selector,
        Err(e) => {
            warn!(field, selector = css, error = %e, "Invalid selector; field left empty");
            return None;
        }
    };
    let found = document.select(&selector).next();
    if found.is_none() {
        warn!(field, selector = css, "Selector matched nothing; field left empty");
    }
    found
}

/// Text of an element with runs of whitespace collapsed and ends trimmed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> Selectors {
        Selectors {
            title: "h1.title".into(),
            date: "span.date".into(),
            content_area: "div.body".into(),
        }
    }

    const PAGE: &str = r#"
        <html><body>
          <h1 class="title">  Corn   starch prices rise </h1>
          <span class="date">2025-03-01</span>
          <div class="body">
            <p>  First paragraph. </p>
            <p></p>
            <div><p>Nested paragraph.</p></div>
            <p>Last one.</p>
          </div>
          <p>Outside the content area.</p>
        </body></html>
    "#;

    #[test]
    fn test_extracts_all_fields() {
        let fields = extract(PAGE, &selectors());
        assert_eq!(fields.title.as_deref(), Some("Corn starch prices rise"));
        assert_eq!(fields.publication_date.as_deref(), Some("2025-03-01"));
        assert_eq!(
            fields.cleaned_text.as_deref(),
            Some("First paragraph.\nNested paragraph.\nLast one.")
        );
    }

    #[test]
    fn test_missing_title_does_not_affect_other_fields() {
        let mut sel = selectors();
        sel.title = "h1.nope".into();
        let fields = extract(PAGE, &sel);
        assert_eq!(fields.title, None);
        assert_eq!(fields.publication_date.as_deref(), Some("2025-03-01"));
        assert!(fields.cleaned_text.is_some());
    }

    #[test]
    fn test_invalid_selector_yields_none() {
        let mut sel = selectors();
        sel.date = "span[[".into();
        let fields = extract(PAGE, &sel);
        assert_eq!(fields.publication_date, None);
        assert!(fields.title.is_some());
    }

    #[test]
    fn test_missing_content_area_is_none() {
        let mut sel = selectors();
        sel.content_area = "article".into();
        let fields = extract(PAGE, &sel);
        assert_eq!(fields.cleaned_text, None);
    }

    #[test]
    fn test_content_area_without_paragraphs_is_empty() {
        let html = r#"<div class="body">just text</div>"#;
        let fields = extract(html, &selectors());
        assert_eq!(fields.cleaned_text.as_deref(), Some(""));
    }

    #[test]
    fn test_date_prefers_datetime_attribute() {
        let html = r#"<h1 class="title">T</h1><span class="date" datetime="2025-01-02T10:00:00Z">Jan 2</span>"#;
        let fields = extract(html, &selectors());
        assert_eq!(
            fields.publication_date.as_deref(),
            Some("2025-01-02T10:00:00Z")
        );
    }

    #[test]
    fn test_blank_title_is_absent() {
        let html = r#"<h1 class="title">   </h1>"#;
        let fields = extract(html, &selectors());
        assert_eq!(fields.title, None);
    }
}
