//! InterviewBit question pages.
//!
//! Questions are `.question-title` blocks, each followed in document order by
//! a `div.answer-text` holding the answer.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{AnswerAdapter, element_text, same_question};

static ANSWER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.answer-text").expect("valid selector"));
static TITLE_OR_ANSWER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".question-title, div.answer-text").expect("valid selector")
});

pub struct InterviewBitAdapter;

impl AnswerAdapter for InterviewBitAdapter {
    fn detect(&self, doc: &Html, url: &Url) -> bool {
        let on_site = url
            .host_str()
            .is_some_and(|host| host.ends_with("interviewbit.com"));
        on_site || doc.select(&ANSWER).next().is_some()
    }

    fn extract_answer(&self, doc: &Html, question: &str) -> Option<String> {
        let mut matched = false;
        let mut titled = false;
        for el in doc.select(&TITLE_OR_ANSWER) {
            let is_answer = el.value().classes().any(|c| c == "answer-text");
            if is_answer {
                if matched && !element_text(&el).is_empty() {
                    return Some(el.inner_html());
                }
            } else {
                titled = true;
                matched = same_question(&element_text(&el), question);
            }
        }

        // Once the page lists titles, an answer belongs to its own title only.
        if titled {
            return None;
        }

        // Single-question pages carry no title at all.
        let mut answers = doc.select(&ANSWER);
        match (answers.next(), answers.next()) {
            (Some(only), None) if !element_text(&only).is_empty() => Some(only.inner_html()),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        "interviewbit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <section>
          <div class="question-title"><h3>1. What is Data Science?</h3></div>
          <div class="answer-text"><p>An interdisciplinary field.</p></div>
        </section>
        <section>
          <div class="question-title"><h3>2. What is bias?</h3></div>
          <div class="answer-text"><p>Error from <b>wrong assumptions</b>.</p></div>
        </section>
    </body></html>"#;

    #[test]
    fn picks_answer_following_matching_title() {
        let doc = Html::parse_document(PAGE);
        let answer = InterviewBitAdapter
            .extract_answer(&doc, "What is bias?")
            .unwrap();
        assert!(answer.contains("wrong assumptions"));
        assert!(!answer.contains("interdisciplinary"));
    }

    #[test]
    fn unknown_question_on_multi_answer_page_is_none() {
        let doc = Html::parse_document(PAGE);
        assert!(
            InterviewBitAdapter
                .extract_answer(&doc, "What is variance?")
                .is_none()
        );
    }

    #[test]
    fn matched_title_without_answer_block_is_none() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div class="question-title"><h3>What is A?</h3></div>
                <div class="answer-text"><p>Answer about A.</p></div>
                <div class="question-title"><h3>What is B?</h3></div>
                <div class="answer"><p>Answer about B.</p></div>
            </body></html>"#,
        );
        assert!(InterviewBitAdapter.extract_answer(&doc, "What is B?").is_none());
        assert!(
            InterviewBitAdapter
                .extract_answer(&doc, "What is A?")
                .unwrap()
                .contains("Answer about A.")
        );
    }

    #[test]
    fn single_answer_page_needs_no_title() {
        let doc = Html::parse_document(
            r#"<div class="answer-text"><p>Only answer here.</p></div>"#,
        );
        let answer = InterviewBitAdapter
            .extract_answer(&doc, "Whatever?")
            .unwrap();
        assert!(answer.contains("Only answer here."));
    }

    #[test]
    fn detects_by_host_or_markup() {
        let empty = Html::parse_document("<html></html>");
        let site = Url::parse("https://www.interviewbit.com/sql-interview-questions/").unwrap();
        let other = Url::parse("https://example.com/").unwrap();
        assert!(InterviewBitAdapter.detect(&empty, &site));
        assert!(!InterviewBitAdapter.detect(&empty, &other));
        assert!(InterviewBitAdapter.detect(&Html::parse_document(PAGE), &other));
    }
}
