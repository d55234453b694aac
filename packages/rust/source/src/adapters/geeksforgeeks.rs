//! GeeksforGeeks articles.
//!
//! Question headings (`h2`/`h3`) sit inside the article body; the answer is
//! the run of paragraphs, lists and code blocks up to the next heading.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{AnswerAdapter, element_text, same_question, section_after};

static CONTENT: LazyLock<[Selector; 3]> = LazyLock::new(|| {
    ["article div.content", "div.text", "article"]
        .map(|s| Selector::parse(s).expect("valid selector"))
});
static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2, h3").expect("valid selector"));
static BODY_BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, pre").expect("valid selector"));
static MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article div.content").expect("valid selector"));

pub struct GeeksforGeeksAdapter;

impl AnswerAdapter for GeeksforGeeksAdapter {
    fn detect(&self, doc: &Html, url: &Url) -> bool {
        let on_site = url
            .host_str()
            .is_some_and(|host| host.ends_with("geeksforgeeks.org"));
        on_site || doc.select(&MARKER).next().is_some()
    }

    fn extract_answer(&self, doc: &Html, question: &str) -> Option<String> {
        let content = CONTENT
            .iter()
            .find_map(|sel| doc.select(sel).next())?;

        let headings: Vec<_> = content.select(&HEADINGS).collect();
        if let Some(heading) = headings
            .iter()
            .find(|h| same_question(&element_text(h), question))
        {
            return section_after(*heading);
        }

        // A page answering one question has no question headings.
        if headings.iter().any(|h| element_text(h).contains('?')) {
            return None;
        }

        let blocks: Vec<String> = content
            .select(&BODY_BLOCKS)
            .filter(|el| !element_text(el).is_empty())
            .map(|el| el.html())
            .collect();
        (!blocks.is_empty()).then(|| blocks.join("\n"))
    }

    fn name(&self) -> &str {
        "geeksforgeeks"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_section_under_heading() {
        let doc = Html::parse_document(
            r#"<article><div class="content">
                <h2>1. What is Python?</h2>
                <p>A high-level language.</p>
                <pre>print("hi")</pre>
                <h2>2. What is PEP 8?</h2>
                <p>A style guide.</p>
            </div></article>"#,
        );
        let answer = GeeksforGeeksAdapter
            .extract_answer(&doc, "What is Python?")
            .unwrap();
        assert!(answer.contains("A high-level language."));
        assert!(answer.contains("<pre>"));
        assert!(!answer.contains("style guide"));
    }

    #[test]
    fn single_answer_page_joins_paragraphs_and_code() {
        let doc = Html::parse_document(
            r#"<article><div class="content">
                <h2>Introduction</h2>
                <p>First paragraph.</p>
                <p>   </p>
                <pre>x = 1</pre>
            </div></article>"#,
        );
        let answer = GeeksforGeeksAdapter
            .extract_answer(&doc, "How do I assign?")
            .unwrap();
        assert_eq!(answer, "<p>First paragraph.</p>\n<pre>x = 1</pre>");
    }

    #[test]
    fn unmatched_question_on_question_list_is_none() {
        let doc = Html::parse_document(
            r#"<article><div class="content">
                <h2>What is a list?</h2><p>Ordered.</p>
            </div></article>"#,
        );
        assert!(
            GeeksforGeeksAdapter
                .extract_answer(&doc, "What is a dict?")
                .is_none()
        );
    }
}
