//! Question sources, page fetching, and answer-page extraction.
//!
//! This crate provides:
//! - [`SourceConnector`]: fetches question candidates from page and search sources
//! - [`AnswerPageScraper`]: extracts a question's answer from its source page
//! - [`adapters`]: site-specific answer extractors (InterviewBit, GeeksforGeeks, generic)
//! - [`search`]: Google Custom Search and Bing Web Search backends

pub mod adapters;
pub mod answer_page;
pub mod connector;
pub mod http;
pub mod search;

pub use adapters::{
    AdapterRegistry, AnswerAdapter, GeeksforGeeksAdapter, GenericAdapter, InterviewBitAdapter,
};
pub use answer_page::{AnswerPageScraper, ScrapedAnswer};
pub use connector::{FetchResult, SourceConnector};
pub use http::HttpFetcher;
pub use search::{BingSearch, GoogleSearch, SearchBackend, SearchHit, backends_from_config};
