//! Generic (fallback) adapter.
//!
//! Always matches. Looks for a heading equal to the question and takes the
//! section beneath it. Pages without question headings yield their main
//! content area.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{AnswerAdapter, element_text, same_question, section_after};

static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").expect("valid selector"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"article, main, [role="main"]"#).expect("valid selector")
});

pub struct GenericAdapter;

impl AnswerAdapter for GenericAdapter {
    fn detect(&self, _doc: &Html, _url: &Url) -> bool {
        true
    }

    fn extract_answer(&self, doc: &Html, question: &str) -> Option<String> {
        let headings: Vec<_> = doc.select(&HEADINGS).collect();
        if let Some(heading) = headings
            .iter()
            .find(|h| same_question(&element_text(h), question))
        {
            return section_after(*heading);
        }

        // A page of other questions holds no answer to this one.
        if headings.iter().any(|h| element_text(h).contains('?')) {
            return None;
        }

        doc.select(&MAIN)
            .find(|el| !element_text(el).is_empty())
            .map(|el| el.inner_html())
    }

    fn name(&self) -> &str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_matching_heading_section() {
        let doc = Html::parse_document(
            r#"<main>
                <h3>What is a closure?</h3>
                <p>A function capturing its environment.</p>
                <h3>What is a generator?</h3>
                <p>A lazy iterator.</p>
            </main>"#,
        );
        let answer = GenericAdapter
            .extract_answer(&doc, "what is a closure?")
            .unwrap();
        assert_eq!(answer, "<p>A function capturing its environment.</p>");
    }

    #[test]
    fn question_list_without_match_is_none() {
        let doc = Html::parse_document(
            r#"<main>
                <p>Intro to the list.</p>
                <h2>1. What is a list?</h2><p>Ordered mutable sequence.</p>
                <h2>2. What is a tuple?</h2><p>Immutable sequence.</p>
            </main>"#,
        );
        assert!(GenericAdapter.extract_answer(&doc, "What is a dict?").is_none());
    }

    #[test]
    fn falls_back_to_main_content() {
        let doc = Html::parse_document("<article><p>Body text.</p></article>");
        let answer = GenericAdapter.extract_answer(&doc, "Unrelated?").unwrap();
        assert!(answer.contains("Body text."));
    }
}
