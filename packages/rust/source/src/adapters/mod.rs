//! Answer-page adapters.
//!
//! Adapters recognize a question site (InterviewBit, GeeksforGeeks, ...) and
//! pull the HTML of the answer that belongs to a given question out of the
//! page the question was scraped from.

mod geeksforgeeks;
mod generic;
mod interviewbit;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use answerbank_shared::normalize_question;

pub use geeksforgeeks::GeeksforGeeksAdapter;
pub use generic::GenericAdapter;
pub use interviewbit::InterviewBitAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Site-specific answer extraction.
///
/// Adapters are tried in priority order; `GenericAdapter` handles pages no
/// site adapter recognizes.
pub trait AnswerAdapter: Send + Sync {
    /// Whether this adapter knows how to read the document.
    fn detect(&self, doc: &Html, url: &Url) -> bool;

    /// HTML of the answer to `question`, if the page contains one.
    fn extract_answer(&self, doc: &Html, question: &str) -> Option<String>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn AnswerAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters (site-specific first, generic last).
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(InterviewBitAdapter),
                Box::new(GeeksforGeeksAdapter),
                Box::new(GenericAdapter),
            ],
        }
    }

    /// Extract the answer with the first adapter that detects the page.
    ///
    /// That adapter's verdict is final: a site adapter finding no answer
    /// does not hand the page on to the generic one. Returns the answer HTML
    /// and the name of the adapter that produced it.
    pub fn extract(&self, doc: &Html, url: &Url, question: &str) -> Option<(String, &str)> {
        let adapter = self.adapters.iter().find(|adapter| adapter.detect(doc, url))?;
        adapter
            .extract_answer(doc, question)
            .map(|html| (html, adapter.name()))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by adapters
// ---------------------------------------------------------------------------

static ENUMERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:q(?:uestion)?\s*)?\d{1,3}\s*[.):-]\s*").expect("valid regex")
});

/// Drop a leading list number (`12. `, `Q3) `) from a question heading.
pub(crate) fn strip_enumeration(text: &str) -> &str {
    match ENUMERATION.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Element text with whitespace collapsed.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a heading on the page is the question we are answering.
pub(crate) fn same_question(heading: &str, question: &str) -> bool {
    let heading = normalize_question(strip_enumeration(heading));
    !heading.is_empty() && heading == normalize_question(strip_enumeration(question))
}

fn is_heading(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3" | "h4")
}

/// Outer HTML of the elements following `heading` up to the next heading.
pub(crate) fn section_after(heading: ElementRef<'_>) -> Option<String> {
    let mut parts = Vec::new();

    for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
        if is_heading(&sibling) {
            break;
        }
        if !element_text(&sibling).is_empty() {
            parts.push(sibling.html());
        }
    }

    (!parts.is_empty()).then(|| parts.join("\n"))
}
