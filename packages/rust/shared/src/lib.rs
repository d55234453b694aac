//! Shared types, error model, configuration, and retry policy for answerbank.
//!
//! This crate is the foundation depended on by all other answerbank crates.
//! It provides:
//! - [`AnswerBankError`]: the unified error type
//! - Domain types ([`Question`], [`Answer`], [`DatasetRecord`], [`QuestionId`])
//! - Configuration ([`AppConfig`], [`SourceConfig`], [`EnrichmentConfig`], config loading)
//! - [`RetryPolicy`]: exponential backoff shared by every network component

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatasetConfig, EnrichmentConfig, EnrichmentSection, FailurePolicy, HttpConfig,
    LlmConfig, RetrySection, SearchConfig, SourceConfig, SourceEntry, SourceKind, config_dir,
    default_config_path, init_config, load_config, load_config_from, resolve_config_path,
    validate_credentials,
};
pub use error::{AnswerBankError, Result};
pub use retry::{Exhausted, Retried, RetryPolicy};
pub use types::{
    Answer, AnswerMethod, DatasetRecord, Question, QuestionId, SourceMeta, normalize_question,
    now_utc,
};
