//! Core orchestration for answerbank: the language-model client, the answer
//! enrichment engine, and the fetch → filter → enrich → merge pipeline.

pub mod enrichment;
pub mod llm;
pub mod pipeline;

pub use enrichment::{EnrichedItem, Enricher, EnrichmentReport, ItemOutcome};
pub use llm::{Completion, LanguageModel, OpenAiChat};
pub use pipeline::{
    ItemFailure, Pipeline, ProgressReporter, RunMode, RunSummary, ScrapeReport, SilentProgress,
    SourceFailure, build_connector, build_enricher, scrape,
};
