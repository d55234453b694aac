//! Source connector: fetches question candidates from configured sources.
//!
//! Page sources are HTML pages whose question elements are picked by a CSS
//! selector; search sources run queries through a [`SearchBackend`] and keep
//! result titles that read as questions. Each upstream call goes through the
//! injected [`RetryPolicy`](answerbank_shared::RetryPolicy).

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use answerbank_shared::{
    AnswerBankError, Question, QuestionId, Result, SourceConfig, SourceEntry, SourceKind,
    SourceMeta, now_utc,
};

use crate::adapters::{element_text, strip_enumeration};
use crate::http::HttpFetcher;
use crate::search::{SearchBackend, SearchHit};

/// Results requested per query for search sources.
const SEARCH_SOURCE_RESULTS: u32 = 10;

// ---------------------------------------------------------------------------
// FetchResult
// ---------------------------------------------------------------------------

/// Outcome of one `fetch_candidates` call.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Unique candidates ordered by identifier.
    pub questions: Vec<Question>,
    /// Number of sources that answered.
    pub sources_ok: usize,
    /// Failed sources (source name, error).
    pub errors: Vec<(String, String)>,
    /// Candidates dropped because an earlier one had the same identifier.
    pub duplicates: usize,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// SourceConnector
// ---------------------------------------------------------------------------

pub struct SourceConnector {
    config: SourceConfig,
    http: HttpFetcher,
    search: Vec<Arc<dyn SearchBackend>>,
}

impl SourceConnector {
    /// Create a connector around an existing fetcher.
    pub fn with_fetcher(
        config: SourceConfig,
        http: HttpFetcher,
        search: Vec<Arc<dyn SearchBackend>>,
    ) -> Self {
        Self {
            config,
            http,
            search,
        }
    }

    /// Fetch every configured source and merge the candidates.
    ///
    /// Individual source failures are logged and reported in the result.
    /// Fails with `SourceUnavailable` only when every source failed.
    #[instrument(skip_all, fields(sources = self.config.sources.len()))]
    pub async fn fetch_candidates(&self) -> Result<FetchResult> {
        let start = Instant::now();
        let mut by_id: BTreeMap<QuestionId, Question> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut sources_ok = 0;
        let mut duplicates = 0;

        if self.config.sources.is_empty() {
            warn!("no sources configured");
        }

        for source in &self.config.sources {
            match self.fetch_source(source).await {
                Ok(questions) => {
                    sources_ok += 1;
                    info!(source = %source.name, count = questions.len(), "source fetched");
                    for question in questions {
                        match by_id.entry(question.id.clone()) {
                            Entry::Vacant(slot) => {
                                slot.insert(question);
                            }
                            Entry::Occupied(_) => duplicates += 1,
                        }
                    }
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "source failed");
                    errors.push((source.name.clone(), e.to_string()));
                }
            }
        }

        if !self.config.sources.is_empty() && sources_ok == 0 {
            let detail = errors
                .iter()
                .map(|(name, err)| format!("{name}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AnswerBankError::SourceUnavailable(detail));
        }

        let result = FetchResult {
            questions: by_id.into_values().collect(),
            sources_ok,
            errors,
            duplicates,
            duration: start.elapsed(),
        };

        info!(
            candidates = result.questions.len(),
            sources_ok = result.sources_ok,
            sources_failed = result.errors.len(),
            duplicates = result.duplicates,
            duration_ms = result.duration.as_millis() as u64,
            "fetch complete"
        );

        Ok(result)
    }

    async fn fetch_source(&self, source: &SourceEntry) -> Result<Vec<Question>> {
        match source.kind {
            SourceKind::Page => self.fetch_page_source(source).await,
            SourceKind::Search => self.fetch_search_source(source).await,
        }
    }

    async fn fetch_page_source(&self, source: &SourceEntry) -> Result<Vec<Question>> {
        let (Some(raw_url), Some(raw_selector)) = (&source.url, &source.selector) else {
            return Err(AnswerBankError::config(format!(
                "page source '{}' needs both `url` and `selector`",
                source.name
            )));
        };

        let url = Url::parse(raw_url).map_err(|e| {
            AnswerBankError::config(format!("source '{}': invalid url: {e}", source.name))
        })?;
        let selector = Selector::parse(raw_selector).map_err(|e| {
            AnswerBankError::config(format!(
                "source '{}': invalid selector '{raw_selector}': {e}",
                source.name
            ))
        })?;

        let body = self
            .config
            .retry
            .run(&source.name, |_| self.http.get_text(&url))
            .await
            .map_err(|exhausted| exhausted.error)?
            .value;

        let texts = extract_questions(&body, &selector);
        debug!(source = %source.name, matched = texts.len(), "selector matched");

        let fetched_at = now_utc();
        Ok(texts
            .into_iter()
            .filter(|text| !source.require_question_mark || text.contains('?'))
            .map(|text| {
                Question::new(
                    &text,
                    SourceMeta {
                        origin: source.name.clone(),
                        link: Some(url.to_string()),
                        fetched_at,
                        tags: source.tags.clone(),
                    },
                )
            })
            .collect())
    }

    async fn fetch_search_source(&self, source: &SourceEntry) -> Result<Vec<Question>> {
        if self.search.is_empty() {
            return Err(AnswerBankError::config(format!(
                "search source '{}' needs a configured search backend",
                source.name
            )));
        }

        let mut questions = Vec::new();
        let mut last_error = None;
        let mut answered = 0;

        for query in &source.queries {
            match self.search_once(query).await {
                Ok(hits) => {
                    answered += 1;
                    let fetched_at = now_utc();
                    for hit in hits {
                        let Some(text) =
                            question_from_title(&hit.title, source.require_question_mark)
                        else {
                            continue;
                        };
                        questions.push(Question::new(
                            &text,
                            SourceMeta {
                                origin: source.name.clone(),
                                link: (!hit.url.is_empty()).then_some(hit.url),
                                fetched_at,
                                tags: source.tags.clone(),
                            },
                        ));
                    }
                }
                Err(e) => {
                    warn!(source = %source.name, query, error = %e, "search query failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if answered == 0 => Err(e),
            _ => Ok(questions),
        }
    }

    /// Run one query against the backends in order until one answers.
    async fn search_once(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut last_error = None;
        for backend in &self.search {
            match self
                .config
                .retry
                .run(backend.name(), |_| backend.search(query, SEARCH_SOURCE_RESULTS))
                .await
            {
                Ok(retried) => return Ok(retried.value),
                Err(exhausted) => {
                    debug!(backend = backend.name(), error = %exhausted, "backend failed");
                    last_error = Some(exhausted.error);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AnswerBankError::config("no search backend configured")))
    }
}

// ---------------------------------------------------------------------------
// Extraction helpers
// ---------------------------------------------------------------------------

/// Texts of all elements matching `selector`, list numbering removed.
fn extract_questions(body: &str, selector: &Selector) -> Vec<String> {
    let doc = Html::parse_document(body);
    doc.select(selector)
        .map(|el| strip_enumeration(&element_text(&el)).to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

/// Turn a search result title into a question.
///
/// Titles like `What is a closure? - Site Name` are cut after the last `?`.
fn question_from_title(title: &str, require_question_mark: bool) -> Option<String> {
    let title = strip_enumeration(title.trim());
    match title.rfind('?') {
        Some(pos) => Some(title[..=pos].trim().to_string()),
        None if !require_question_mark && !title.is_empty() => Some(title.to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use answerbank_shared::RetryPolicy;
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
        }
    }

    fn page_source(name: &str, url: String, selector: &str) -> SourceEntry {
        SourceEntry {
            name: name.into(),
            kind: SourceKind::Page,
            url: Some(url),
            selector: Some(selector.into()),
            queries: Vec::new(),
            tags: vec!["tech".into()],
            require_question_mark: true,
        }
    }

    fn connector(
        sources: Vec<SourceEntry>,
        search: Vec<Arc<dyn SearchBackend>>,
    ) -> SourceConnector {
        let config = SourceConfig {
            sources,
            retry: fast_retry(3),
            timeout: Duration::from_secs(2),
            user_agent: "test".into(),
        };
        let http = HttpFetcher::new("test", Duration::from_secs(2))
            .unwrap()
            .allow_private_hosts();
        SourceConnector::with_fetcher(config, http, search)
    }

    struct FixedSearch(Vec<SearchHit>);

    #[async_trait]
    impl SearchBackend for FixedSearch {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, _query: &str, _limit: u32) -> Result<Vec<SearchHit>> {
            Ok(self.0.clone())
        }
    }

    struct DownSearch;

    #[async_trait]
    impl SearchBackend for DownSearch {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(&self, _query: &str, _limit: u32) -> Result<Vec<SearchHit>> {
            Err(AnswerBankError::Auth("bad key".into()))
        }
    }

    #[test]
    fn titles_become_questions() {
        assert_eq!(
            question_from_title("What is a closure? - Some Blog", true).as_deref(),
            Some("What is a closure?")
        );
        assert_eq!(question_from_title("Rust book", true), None);
        assert_eq!(
            question_from_title("Rust book", false).as_deref(),
            Some("Rust book")
        );
    }

    #[test]
    fn extract_strips_numbering() {
        let selector = Selector::parse("h2").unwrap();
        let texts = extract_questions(
            "<article><h2>1. What is  Python?</h2><h2>Summary</h2></article>",
            &selector,
        );
        assert_eq!(texts, vec!["What is Python?", "Summary"]);
    }

    #[tokio::test]
    async fn page_sources_are_merged_and_sorted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="question-title">What is bias?</div>
                   <div class="question-title">What is variance?</div>
                   <div class="question-title">Conclusion</div>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<article><h2>1. What is   BIAS ?</h2><h2>2. What is a p-value?</h2></article>",
            ))
            .mount(&server)
            .await;

        let connector = connector(
            vec![
                page_source("a", format!("{}/a", server.uri()), ".question-title"),
                page_source("b", format!("{}/b", server.uri()), "article h2"),
            ],
            Vec::new(),
        );

        let result = connector.fetch_candidates().await.unwrap();
        assert_eq!(result.sources_ok, 2);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.questions.len(), 3);

        let ids: Vec<_> = result.questions.iter().map(|q| q.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        // First source wins for the duplicate.
        let bias = result
            .questions
            .iter()
            .find(|q| q.id == QuestionId::from_text("what is bias?"))
            .unwrap();
        assert_eq!(bias.source.origin, "a");
        assert_eq!(bias.source.tags, vec!["tech".to_string()]);
    }

    #[tokio::test]
    async fn one_failing_source_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<h2>What is a tensor?</h2>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let connector = connector(
            vec![
                page_source("ok", format!("{}/ok", server.uri()), "h2"),
                page_source("down", format!("{}/down", server.uri()), "h2"),
            ],
            Vec::new(),
        );

        let result = connector.fetch_candidates().await.unwrap();
        assert_eq!(result.sources_ok, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, "down");
        assert_eq!(result.questions.len(), 1);
    }

    #[tokio::test]
    async fn all_sources_exhausted_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let connector = connector(
            vec![page_source("down", format!("{}/down", server.uri()), "h2")],
            Vec::new(),
        );

        let err = connector.fetch_candidates().await.unwrap_err();
        assert!(matches!(err, AnswerBankError::SourceUnavailable(_)));
        assert!(err.to_string().contains("down"));
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<h2>What is dropout?</h2>"),
            )
            .mount(&server)
            .await;

        let connector = connector(
            vec![page_source("flaky", format!("{}/flaky", server.uri()), "h2")],
            Vec::new(),
        );

        let result = connector.fetch_candidates().await.unwrap();
        assert_eq!(result.questions.len(), 1);
        assert_eq!(result.questions[0].text, "What is dropout?");
    }

    #[tokio::test]
    async fn search_source_uses_first_working_backend() {
        let source = SourceEntry {
            name: "search".into(),
            kind: SourceKind::Search,
            url: None,
            selector: None,
            queries: vec!["rust interview questions".into()],
            tags: Vec::new(),
            require_question_mark: true,
        };
        let hits = vec![
            SearchHit {
                title: "What is ownership in Rust? | Blog".into(),
                snippet: "Ownership is...".into(),
                url: "https://blog.example/ownership".into(),
            },
            SearchHit {
                title: "Top 50 Rust questions".into(),
                snippet: String::new(),
                url: String::new(),
            },
        ];

        let connector = connector(
            vec![source],
            vec![Arc::new(DownSearch), Arc::new(FixedSearch(hits))],
        );

        let result = connector.fetch_candidates().await.unwrap();
        assert_eq!(result.questions.len(), 1);
        let q = &result.questions[0];
        assert_eq!(q.text, "What is ownership in Rust?");
        assert_eq!(q.source.link.as_deref(), Some("https://blog.example/ownership"));
    }

    #[tokio::test]
    async fn search_source_without_backend_fails() {
        let source = SourceEntry {
            name: "search".into(),
            kind: SourceKind::Search,
            url: None,
            selector: None,
            queries: vec!["q".into()],
            tags: Vec::new(),
            require_question_mark: true,
        };
        let err = connector(vec![source], Vec::new())
            .fetch_candidates()
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerBankError::SourceUnavailable(_)));
    }
}
