//! Pipeline coordinator: fetch → filter → enrich → merge.
//!
//! Only two failures stop a run: every source being unavailable (before any
//! write, including running out of time while fetching) and the dataset
//! write itself. One wall-clock deadline, taken when the run starts, bounds
//! both fetching and enrichment. Per-question enrichment failures are
//! logged, counted in the [`RunSummary`], and handled by the configured
//! [`FailurePolicy`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use answerbank_shared::{
    AnswerBankError, AppConfig, DatasetConfig, DatasetRecord, EnrichmentConfig, FailurePolicy,
    Question, QuestionId, Result, SourceConfig,
};
use answerbank_source::{AnswerPageScraper, FetchResult, HttpFetcher, SourceConnector, backends_from_config};
use answerbank_storage::{Dataset, DatasetWriter, DedupStore, WriteResult};

use crate::enrichment::{EnrichmentReport, Enricher, ItemOutcome};
use crate::llm::OpenAiChat;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when enrichment of a question finishes (`ok` = answered).
    fn item_done(&self, question: &Question, ok: bool, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _question: &Question, _ok: bool, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Run,
    Fill,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub id: QuestionId,
    pub question: String,
    pub error: String,
}

/// Everything a run did, for logs and `--summary-json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Unique candidates returned by the sources.
    pub fetched: usize,
    pub sources_failed: Vec<SourceFailure>,
    /// Candidates not yet in the dataset.
    pub new: usize,
    /// Pending records re-attempted.
    pub backfilled: usize,
    pub answered: usize,
    pub answered_by_method: BTreeMap<String, usize>,
    pub failed: Vec<ItemFailure>,
    pub abandoned: usize,
    pub timed_out: bool,
    /// Null-answer records written under the placeholder policy.
    pub placeholders: usize,
    /// Failed new questions left out under the drop policy.
    pub dropped: usize,
    pub write: Option<WriteResult>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            fetched: 0,
            sources_failed: Vec::new(),
            new: 0,
            backfilled: 0,
            answered: 0,
            answered_by_method: BTreeMap::new(),
            failed: Vec::new(),
            abandoned: 0,
            timed_out: false,
            placeholders: 0,
            dropped: 0,
            write: None,
            elapsed_ms: 0,
        }
    }

    /// Whether the dataset file was rewritten.
    pub fn changed(&self) -> bool {
        self.write.as_ref().is_some_and(|w| w.changed)
    }
}

/// Result of `scrape`: candidates that a run would enrich.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub fetch: FetchResult,
    pub new: Vec<Question>,
    pub known: usize,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the source connector (no credentials needed).
pub fn build_connector(config: &AppConfig) -> Result<SourceConnector> {
    let source_config = SourceConfig::from(config);
    let http = HttpFetcher::new(&source_config.user_agent, source_config.timeout)?;
    let search = backends_from_config(&config.search, http.client());
    Ok(SourceConnector::with_fetcher(source_config, http, search))
}

/// Build the enrichment engine. Fails when the LLM key is missing.
pub fn build_enricher(config: &AppConfig) -> Result<Enricher> {
    let llm = OpenAiChat::from_config(&config.llm, &config.http)?;
    let enrichment = EnrichmentConfig::from(config);

    let http = HttpFetcher::new(
        &config.http.user_agent,
        Duration::from_secs(config.http.timeout_secs),
    )?;
    let search = backends_from_config(&config.search, http.client());
    let pages = AnswerPageScraper::new(http, Some(enrichment.max_answer_words));

    Ok(Enricher::new(enrichment, Arc::new(llm), &config.llm.system_prompt)
        .with_search(search, config.search.max_results)
        .with_pages(pages))
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    connector: SourceConnector,
    enricher: Arc<Enricher>,
    dataset: DatasetConfig,
    dataset_path: PathBuf,
}

impl Pipeline {
    pub fn new(connector: SourceConnector, enricher: Enricher, dataset: DatasetConfig) -> Self {
        Self {
            dataset_path: PathBuf::from(&dataset.path),
            connector,
            enricher: Arc::new(enricher),
            dataset,
        }
    }

    /// Wire every component from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            build_connector(config)?,
            build_enricher(config)?,
            config.dataset.clone(),
        ))
    }

    /// Override the dataset path (CLI `--dataset`).
    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// Full run: fetch new questions, answer them (plus pending backfill),
    /// and merge the results into the dataset.
    #[instrument(skip_all, fields(dataset = %self.dataset_path.display()))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunSummary> {
        let start = Instant::now();
        let deadline = self.deadline(start);
        let mut summary = RunSummary::new(RunMode::Run);

        progress.phase("Loading dataset");
        let dataset = Dataset::load(&self.dataset_path)?;

        progress.phase("Fetching questions");
        let fetching = self.connector.fetch_candidates();
        let fetch = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fetching)
                .await
                .map_err(|_| {
                    AnswerBankError::SourceUnavailable(
                        "run timeout expired while fetching sources".into(),
                    )
                })??,
            None => fetching.await?,
        };
        summary.fetched = fetch.questions.len();
        summary.sources_failed = fetch
            .errors
            .iter()
            .map(|(source, error)| SourceFailure {
                source: source.clone(),
                error: error.clone(),
            })
            .collect();

        let dedup = DedupStore::from_dataset(&dataset);
        let mut work = dedup.filter_new(fetch.questions);
        summary.new = work.len();

        let backfill = self.backfill_work(&dataset);
        summary.backfilled = backfill.len();
        let backfill_ids: HashSet<QuestionId> = backfill.iter().map(|q| q.id.clone()).collect();
        work.extend(backfill);

        info!(
            fetched = summary.fetched,
            known = dedup.len(),
            new = summary.new,
            backfill = summary.backfilled,
            "work scheduled"
        );

        progress.phase("Answering questions");
        let report = Arc::clone(&self.enricher)
            .enrich_until(work, deadline, progress)
            .await;
        let records = self.apply_policy(report, &backfill_ids, &mut summary);

        progress.phase("Writing dataset");
        summary.write = Some(DatasetWriter::new(&self.dataset_path).merge(records)?);
        summary.elapsed_ms = start.elapsed().as_millis() as u64;

        log_summary(&summary);
        progress.done(&summary);
        Ok(summary)
    }

    /// Backfill only: answer pending records without fetching.
    #[instrument(skip_all, fields(dataset = %self.dataset_path.display()))]
    pub async fn fill(&self, progress: &dyn ProgressReporter) -> Result<RunSummary> {
        let start = Instant::now();
        let deadline = self.deadline(start);
        let mut summary = RunSummary::new(RunMode::Fill);

        progress.phase("Loading dataset");
        let dataset = Dataset::load(&self.dataset_path)?;
        let work: Vec<Question> = dataset.pending().iter().map(|r| r.to_question()).collect();
        summary.backfilled = work.len();
        let backfill_ids: HashSet<QuestionId> = work.iter().map(|q| q.id.clone()).collect();

        progress.phase("Answering questions");
        let report = Arc::clone(&self.enricher)
            .enrich_until(work, deadline, progress)
            .await;
        let records = self.apply_policy(report, &backfill_ids, &mut summary);

        progress.phase("Writing dataset");
        summary.write = Some(DatasetWriter::new(&self.dataset_path).merge(records)?);
        summary.elapsed_ms = start.elapsed().as_millis() as u64;

        log_summary(&summary);
        progress.done(&summary);
        Ok(summary)
    }

    fn deadline(&self, start: Instant) -> Option<Instant> {
        self.enricher.run_timeout().map(|timeout| start + timeout)
    }

    fn backfill_work(&self, dataset: &Dataset) -> Vec<Question> {
        if !self.dataset.backfill_pending {
            return Vec::new();
        }
        dataset.pending().iter().map(|r| r.to_question()).collect()
    }

    /// Turn enrichment outcomes into records to merge.
    ///
    /// A failed backfill produces no record, so the existing line stays
    /// byte-identical.
    fn apply_policy(
        &self,
        report: EnrichmentReport,
        backfill_ids: &HashSet<QuestionId>,
        summary: &mut RunSummary,
    ) -> Vec<DatasetRecord> {
        summary.answered = report.answered;
        summary.abandoned = report.abandoned;
        summary.timed_out = report.timed_out;

        let mut records = Vec::with_capacity(report.items.len());
        for item in report.items {
            let is_backfill = backfill_ids.contains(&item.question.id);
            match item.outcome {
                ItemOutcome::Answered(answer) => {
                    *summary
                        .answered_by_method
                        .entry(answer.method.as_str().to_string())
                        .or_default() += 1;
                    records.push(DatasetRecord::new(item.question, Some(answer)));
                    continue;
                }
                ItemOutcome::Failed(error) => summary.failed.push(ItemFailure {
                    id: item.question.id.clone(),
                    question: item.question.text.clone(),
                    error,
                }),
                ItemOutcome::Abandoned => {}
            }

            if is_backfill {
                continue;
            }
            match self.dataset.failure_policy {
                FailurePolicy::Placeholder => {
                    summary.placeholders += 1;
                    records.push(DatasetRecord::new(item.question, None));
                }
                FailurePolicy::Drop => summary.dropped += 1,
            }
        }
        records
    }
}

/// Fetch and filter without enriching or writing.
#[instrument(skip_all, fields(dataset = %dataset_path.display()))]
pub async fn scrape(connector: &SourceConnector, dataset_path: &Path) -> Result<ScrapeReport> {
    let dataset = Dataset::load(dataset_path)?;
    let fetch = connector.fetch_candidates().await?;
    let dedup = DedupStore::from_dataset(&dataset);
    let new = dedup.filter_new(fetch.questions.clone());
    let known = fetch.questions.len() - new.len();

    info!(fetched = fetch.questions.len(), new = new.len(), known, "scrape complete");

    Ok(ScrapeReport { fetch, new, known })
}

fn log_summary(summary: &RunSummary) {
    for failure in &summary.failed {
        warn!(id = %failure.id, error = %failure.error, "question left unanswered");
    }
    let (inserted, updated, total, changed) = summary
        .write
        .as_ref()
        .map(|w| (w.inserted, w.updated, w.total, w.changed))
        .unwrap_or_default();
    info!(
        mode = ?summary.mode,
        fetched = summary.fetched,
        new = summary.new,
        backfilled = summary.backfilled,
        answered = summary.answered,
        failed = summary.failed.len(),
        abandoned = summary.abandoned,
        timed_out = summary.timed_out,
        inserted,
        updated,
        total,
        changed,
        elapsed_ms = summary.elapsed_ms,
        "run complete"
    );
}
