//! Answer enrichment engine.
//!
//! Each question runs through a cascade: the question's own source page,
//! then (optionally) a search snippet, then the language model grounded with
//! search snippets. Questions are processed by a fixed-size worker pool fed
//! from a channel; each worker writes its result into its item's slot exactly
//! once. The phase stops at the run's deadline, after which in-flight work
//! is abandoned and finished slots are kept.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use answerbank_markdown::truncate_words;
use answerbank_shared::{
    Answer, AnswerBankError, AnswerMethod, EnrichmentConfig, Question, Result, now_utc,
};
use answerbank_source::{AnswerPageScraper, SearchBackend, SearchHit};

use crate::llm::LanguageModel;
use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Final state of one scheduled question.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Answered(Answer),
    /// Every step of the cascade failed; carries the last error.
    Failed(String),
    /// Still in flight (or queued) when the run timeout expired.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct EnrichedItem {
    pub question: Question,
    pub outcome: ItemOutcome,
}

/// Outcome of a whole enrichment phase, items in scheduling order.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    pub items: Vec<EnrichedItem>,
    pub answered: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub timed_out: bool,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Produces answers for questions.
pub struct Enricher {
    config: EnrichmentConfig,
    llm: Arc<dyn LanguageModel>,
    system_prompt: String,
    search: Vec<Arc<dyn SearchBackend>>,
    search_results: u32,
    pages: Option<AnswerPageScraper>,
}

impl Enricher {
    pub fn new(config: EnrichmentConfig, llm: Arc<dyn LanguageModel>, system_prompt: &str) -> Self {
        Self {
            config,
            llm,
            system_prompt: system_prompt.to_string(),
            search: Vec::new(),
            search_results: 3,
            pages: None,
        }
    }

    /// Search backends used for grounding and snippet answers, tried in order.
    pub fn with_search(mut self, backends: Vec<Arc<dyn SearchBackend>>, max_results: u32) -> Self {
        self.search = backends;
        self.search_results = max_results.max(1);
        self
    }

    /// Scraper used to read answers from a question's source page.
    pub fn with_pages(mut self, pages: AnswerPageScraper) -> Self {
        self.pages = Some(pages);
        self
    }

    /// Wall-clock budget for a whole run (`None` = unbounded).
    pub fn run_timeout(&self) -> Option<Duration> {
        (!self.config.run_timeout.is_zero()).then_some(self.config.run_timeout)
    }

    /// Answer one question, or fail with `Enrichment`.
    #[instrument(skip_all, fields(id = %question.id))]
    pub async fn answer(&self, question: &Question) -> Result<Answer> {
        if let Some(answer) = self.from_source_page(question).await {
            return Ok(answer);
        }

        let wants_snippets = self.config.use_search_grounding || self.config.search_snippet_fallback;
        let (hits, backend) = if wants_snippets {
            self.search_snippets(&question.text).await
        } else {
            (Vec::new(), None)
        };

        if self.config.search_snippet_fallback {
            if let (Some(hit), Some(backend)) = (hits.first(), &backend) {
                let (text, _) = truncate_words(hit.snippet.trim(), self.config.max_answer_words);
                debug!(backend = %backend, "answered from search snippet");
                return Ok(Answer {
                    text,
                    method: AnswerMethod::SearchSnippet,
                    model: Some(backend.clone()),
                    generated_at: now_utc(),
                    retries: 0,
                });
            }
        }

        let grounding: &[SearchHit] = if self.config.use_search_grounding {
            &hits
        } else {
            &[]
        };
        let prompt = build_prompt(&question.text, grounding, self.config.max_answer_words);

        self.pace().await;
        let retried = self
            .config
            .retry
            .run("llm", |_| self.llm.complete(&self.system_prompt, &prompt))
            .await
            .map_err(|exhausted| AnswerBankError::Enrichment(exhausted.to_string()))?;

        Ok(Answer {
            text: retried.value.text,
            method: AnswerMethod::Llm,
            model: Some(retried.value.model),
            generated_at: now_utc(),
            retries: retried.retries,
        })
    }

    /// Step 1: the answer printed next to the question on its own page.
    async fn from_source_page(&self, question: &Question) -> Option<Answer> {
        if !self.config.use_source_page {
            return None;
        }
        let pages = self.pages.as_ref()?;
        let link = question.source.link.as_deref()?;

        if !pages.is_cached(link).await {
            self.pace().await;
        }
        match self
            .config
            .retry
            .run("source_page", |_| pages.scrape(link, &question.text))
            .await
        {
            Ok(retried) => retried.value.map(|scraped| Answer {
                text: scraped.text,
                method: AnswerMethod::SourcePage,
                model: Some(scraped.adapter),
                generated_at: now_utc(),
                retries: retried.retries,
            }),
            Err(exhausted) => {
                debug!(link, error = %exhausted, "source page unusable");
                None
            }
        }
    }

    /// Non-empty snippets from the first backend that answers.
    async fn search_snippets(&self, query: &str) -> (Vec<SearchHit>, Option<String>) {
        for backend in &self.search {
            self.pace().await;
            match self
                .config
                .retry
                .run(backend.name(), |_| backend.search(query, self.search_results))
                .await
            {
                Ok(retried) => {
                    let hits: Vec<SearchHit> = retried
                        .value
                        .into_iter()
                        .filter(|hit| !hit.snippet.trim().is_empty())
                        .collect();
                    if !hits.is_empty() {
                        return (hits, Some(backend.name().to_string()));
                    }
                }
                Err(exhausted) => {
                    debug!(backend = backend.name(), error = %exhausted, "search failed");
                }
            }
        }
        (Vec::new(), None)
    }

    async fn pace(&self) {
        if !self.config.rate_limit.is_zero() {
            tokio::time::sleep(self.config.rate_limit).await;
        }
    }

    /// Answer every question with the worker pool, abandoning whatever is
    /// unfinished at `deadline`.
    ///
    /// Never fails: per-item errors end up in the report.
    #[instrument(skip_all, fields(items = questions.len(), concurrency = self.config.concurrency))]
    pub async fn enrich_until(
        self: Arc<Self>,
        questions: Vec<Question>,
        deadline: Option<Instant>,
        progress: &dyn ProgressReporter,
    ) -> EnrichmentReport {
        let start = Instant::now();
        let total = questions.len();
        if total == 0 {
            return EnrichmentReport::default();
        }

        let questions = Arc::new(questions);
        let slots: Arc<Vec<OnceLock<std::result::Result<Answer, String>>>> =
            Arc::new((0..total).map(|_| OnceLock::new()).collect());

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<usize>();
        for index in 0..total {
            // The receiver is alive until the workers are spawned.
            let _ = queue_tx.send(index);
        }
        drop(queue_tx);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, bool)>();
        let mut workers = JoinSet::new();

        for worker in 0..self.config.concurrency.max(1).min(total) {
            let this = Arc::clone(&self);
            let questions = Arc::clone(&questions);
            let slots = Arc::clone(&slots);
            let queue_rx = Arc::clone(&queue_rx);
            let done_tx = done_tx.clone();

            workers.spawn(async move {
                loop {
                    let next = queue_rx.lock().await.recv().await;
                    let Some(index) = next else { break };
                    let question = &questions[index];

                    let outcome = match this.answer(question).await {
                        Ok(answer) => {
                            debug!(worker, id = %question.id, method = answer.method.as_str(), "answered");
                            Ok(answer)
                        }
                        Err(e) => {
                            warn!(worker, id = %question.id, error = %e, "enrichment failed");
                            Err(e.to_string())
                        }
                    };
                    let ok = outcome.is_ok();
                    let _ = slots[index].set(outcome);
                    let _ = done_tx.send((index, ok));
                }
            });
        }
        drop(done_tx);

        let collect = async {
            let mut finished = 0;
            while let Some((index, ok)) = done_rx.recv().await {
                finished += 1;
                progress.item_done(&questions[index], ok, finished, total);
            }
        };

        let timed_out = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        if timed_out {
            warn!("run deadline reached, abandoning in-flight items");
            workers.abort_all();
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    warn!(error = %e, "enrichment worker crashed");
                }
            }
        }

        let questions = Arc::try_unwrap(questions).unwrap_or_else(|shared| (*shared).clone());
        let mut report = EnrichmentReport {
            timed_out,
            ..EnrichmentReport::default()
        };

        for (question, slot) in questions.into_iter().zip(slots.iter()) {
            let outcome = match slot.get() {
                Some(Ok(answer)) => {
                    report.answered += 1;
                    ItemOutcome::Answered(answer.clone())
                }
                Some(Err(error)) => {
                    report.failed += 1;
                    ItemOutcome::Failed(error.clone())
                }
                None => {
                    report.abandoned += 1;
                    ItemOutcome::Abandoned
                }
            };
            report.items.push(EnrichedItem { question, outcome });
        }
        report.duration = start.elapsed();

        info!(
            answered = report.answered,
            failed = report.failed,
            abandoned = report.abandoned,
            timed_out,
            duration_ms = report.duration.as_millis() as u64,
            "enrichment complete"
        );

        report
    }
}

/// User message for the model.
fn build_prompt(question: &str, grounding: &[SearchHit], max_words: usize) -> String {
    let mut prompt = format!("Generate a concise interview answer under {max_words} words.\n\n");

    if !grounding.is_empty() {
        prompt.push_str("Web search results:\n");
        for hit in grounding {
            prompt.push_str(&format!("- {}: {}\n", hit.title.trim(), hit.snippet.trim()));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Q: {question}\nA:"));
    prompt
}
