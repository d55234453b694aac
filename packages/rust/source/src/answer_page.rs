//! Answer extraction from a question's source page.
//!
//! Questions scraped from one listing page share its link, so fetched bodies
//! are kept for the life of the scraper and each page is downloaded once.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use answerbank_markdown::{ConvertOptions, convert};
use answerbank_shared::{AnswerBankError, Result};
use scraper::Html;

use crate::adapters::AdapterRegistry;
use crate::http::HttpFetcher;

/// Answer text scraped from a page, already converted to Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedAnswer {
    pub text: String,
    /// Adapter that located the answer.
    pub adapter: String,
    pub truncated: bool,
}

/// Fetches a question's link and extracts the matching answer.
pub struct AnswerPageScraper {
    http: HttpFetcher,
    registry: AdapterRegistry,
    max_words: Option<usize>,
    bodies: Mutex<HashMap<String, String>>,
}

impl AnswerPageScraper {
    pub fn new(http: HttpFetcher, max_words: Option<usize>) -> Self {
        Self {
            http,
            registry: AdapterRegistry::new(),
            max_words,
            bodies: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `link` was already downloaded and needs no request.
    pub async fn is_cached(&self, link: &str) -> bool {
        self.bodies.lock().await.contains_key(link)
    }

    /// Extract the answer to `question` from `link`, fetching it on first use.
    ///
    /// `Ok(None)` means the page loaded but holds no usable answer. Retries
    /// are the caller's concern; failed fetches are not cached.
    #[instrument(skip_all, fields(link = %link))]
    pub async fn scrape(&self, link: &str, question: &str) -> Result<Option<ScrapedAnswer>> {
        let url = Url::parse(link)
            .map_err(|e| AnswerBankError::validation(format!("invalid link '{link}': {e}")))?;

        let cached = self.bodies.lock().await.get(link).cloned();
        let body = match cached {
            Some(body) => body,
            None => {
                let body = self.http.get_text(&url).await?;
                self.bodies
                    .lock()
                    .await
                    .insert(link.to_string(), body.clone());
                body
            }
        };
        self.extract(&body, &url, question)
    }

    /// Extract from an already fetched page body.
    pub fn extract(&self, body: &str, url: &Url, question: &str) -> Result<Option<ScrapedAnswer>> {
        // `Html` is not `Send`; keep it out of any await.
        let (html, adapter) = {
            let doc = Html::parse_document(body);
            match self.registry.extract(&doc, url, question) {
                Some((html, adapter)) => (html, adapter.to_string()),
                None => {
                    debug!("no answer block found");
                    return Ok(None);
                }
            }
        };

        let converted = convert(
            &html,
            &ConvertOptions {
                source_url: Some(url.to_string()),
                max_words: self.max_words,
            },
        )?;

        if converted.text.trim().is_empty() {
            return Ok(None);
        }

        debug!(
            adapter = %adapter,
            words = converted.word_count,
            truncated = converted.truncated,
            "answer extracted from page"
        );

        Ok(Some(ScrapedAnswer {
            text: converted.text,
            adapter,
            truncated: converted.truncated,
        }))
    }
}
