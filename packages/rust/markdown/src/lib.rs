//! HTML-to-Markdown conversion for scraped answers.
//!
//! Answer blocks extracted from question pages are converted to Markdown with
//! `htmd`, run through a series of cleanup passes, and optionally capped to a
//! word budget so they fit alongside generated answers in the dataset.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};
use url::Url;

use answerbank_shared::{AnswerBankError, Result};

/// Marker appended when an answer is cut to the word budget.
const TRUNCATION_MARKER: &str = " …";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting an answer fragment to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// Cleaned Markdown text, trimmed, without a trailing newline.
    pub text: String,
    /// Word count of `text` (code blocks excluded).
    pub word_count: usize,
    /// Whether the text was cut to `max_words`.
    pub truncated: bool,
}

/// Options for the conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Page URL used to resolve relative links.
    pub source_url: Option<String>,
    /// Word budget; `None` keeps the full text.
    pub max_words: Option<usize>,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert an HTML answer fragment to clean Markdown.
///
/// Returns a `Conversion` error when htmd fails, and an empty `text` when the
/// fragment has no readable content.
#[instrument(skip_all, fields(url = opts.source_url.as_deref().unwrap_or("-")))]
pub fn convert(html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg", "button"])
        .build();

    let raw_markdown = converter
        .convert(html)
        .map_err(|e| AnswerBankError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base_url = opts.source_url.as_deref().and_then(|u| Url::parse(u).ok());
    let cleaned = cleanup::run_pipeline(&raw_markdown, base_url.as_ref());

    let (text, truncated) = match opts.max_words {
        Some(max) => truncate_words(&cleaned, max),
        None => (cleaned, false),
    };
    let word_count = count_words(&text);

    debug!(raw_len = raw_markdown.len(), word_count, truncated, "answer conversion complete");

    Ok(ConvertResult {
        text,
        word_count,
        truncated,
    })
}

/// Cut `text` after `max_words` words, keeping the original formatting of
/// the kept prefix.
pub fn truncate_words(text: &str, max_words: usize) -> (String, bool) {
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\S+").expect("valid regex"));

    if max_words == 0 {
        return (String::new(), !text.trim().is_empty());
    }

    match WORD_RE.find_iter(text).nth(max_words) {
        Some(next_word) => {
            let kept = text[..next_word.start()].trim_end();
            (format!("{kept}{TRUNCATION_MARKER}"), true)
        }
        None => (text.to_string(), false),
    }
}

/// Count words outside fenced code blocks.
pub fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    CODE_BLOCK_RE.replace_all(md, "").split_whitespace().count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
