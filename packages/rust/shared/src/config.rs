//! Application configuration for answerbank.
//!
//! Config resolution order: an explicit `--config` path, then
//! `./answerbank.toml`, then `~/.answerbank/answerbank.toml`, then defaults.
//! Credentials are never stored in the file, only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnswerBankError, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "answerbank.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".answerbank";

/// User-Agent sent when the config does not override it.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) answerbank";

// ---------------------------------------------------------------------------
// Config structs (matching answerbank.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Question sources, queried in order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceEntry>,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub enrichment: EnrichmentSection,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            sources: default_sources(),
            retry: RetrySection::default(),
            enrichment: EnrichmentSection::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// What to do with questions whose enrichment failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Persist the question with a null answer (backfilled on later runs).
    Placeholder,
    /// Leave the question out; a later run sees it as new again.
    Drop,
}

/// `[dataset]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path of the JSON Lines dataset file.
    #[serde(default = "default_dataset_path")]
    pub path: String,

    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,

    /// Re-attempt null-answer records on every run.
    #[serde(default = "default_true")]
    pub backfill_pending: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            failure_policy: default_failure_policy(),
            backfill_pending: true,
        }
    }
}

fn default_dataset_path() -> String {
    "data/questions.jsonl".into()
}
fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Placeholder
}
fn default_true() -> bool {
    true
}

/// Kind of question source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// An HTML page whose question elements are picked by a CSS selector.
    Page,
    /// Search queries whose result titles are treated as questions.
    Search,
}

/// `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Unique source name, recorded as the question origin.
    pub name: String,

    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,

    /// Page URL (`page` sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// CSS selector matching question elements (`page` sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Search queries (`search` sources).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,

    /// Tags attached to every question from this source.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Keep only candidates containing a `?`.
    #[serde(default = "default_true")]
    pub require_question_mark: bool,
}

fn default_source_kind() -> SourceKind {
    SourceKind::Page
}

fn default_sources() -> Vec<SourceEntry> {
    vec![
        SourceEntry {
            name: "interviewbit-data-science".into(),
            kind: SourceKind::Page,
            url: Some("https://www.interviewbit.com/data-science-interview-questions/".into()),
            selector: Some(".question-title".into()),
            queries: Vec::new(),
            tags: vec!["tech".into(), "data-science".into()],
            require_question_mark: true,
        },
        SourceEntry {
            name: "geeksforgeeks-python".into(),
            kind: SourceKind::Page,
            url: Some("https://www.geeksforgeeks.org/python-interview-questions/".into()),
            selector: Some("article h2".into()),
            queries: Vec::new(),
            tags: vec!["tech".into(), "python".into()],
            require_question_mark: true,
        },
    ]
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
            jitter: section.jitter,
        }
    }
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSection {
    /// Maximum number of questions being answered at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause each worker takes before a backend request.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Wall-clock budget for the whole enrichment phase.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Try to extract the answer from the question's source page first.
    #[serde(default = "default_true")]
    pub use_source_page: bool,

    /// Add search snippets to the LLM prompt.
    #[serde(default = "default_true")]
    pub use_search_grounding: bool,

    /// Accept a top search snippet as the answer before calling the LLM.
    #[serde(default)]
    pub search_snippet_fallback: bool,

    /// Target answer length in words.
    #[serde(default = "default_max_answer_words")]
    pub max_answer_words: usize,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            use_source_page: true,
            use_search_grounding: true,
            search_snippet_fallback: false,
            max_answer_words: default_max_answer_words(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_rate_limit_ms() -> u64 {
    1_000
}
fn default_run_timeout_secs() -> u64 {
    1_800
}
fn default_max_answer_words() -> usize {
    75
}

/// `[llm]` section (any OpenAI-compatible chat completions endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        read_env(&self.api_key_env).ok_or_else(|| {
            AnswerBankError::config(format!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            ))
        })
    }
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    200
}
fn default_temperature() -> f64 {
    0.2
}
fn default_system_prompt() -> String {
    "You are a concise, factual assistant.".into()
}

/// `[search]` section. A backend is enabled only when its credentials are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_google_key_env")]
    pub google_api_key_env: String,

    #[serde(default = "default_google_cx_env")]
    pub google_cx_env: String,

    #[serde(default = "default_bing_key_env")]
    pub bing_api_key_env: String,

    #[serde(default = "default_google_base_url")]
    pub google_base_url: String,

    #[serde(default = "default_bing_base_url")]
    pub bing_base_url: String,

    /// Results requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google_api_key_env: default_google_key_env(),
            google_cx_env: default_google_cx_env(),
            bing_api_key_env: default_bing_key_env(),
            google_base_url: default_google_base_url(),
            bing_base_url: default_bing_base_url(),
            max_results: default_max_results(),
        }
    }
}

impl SearchConfig {
    /// Google Custom Search `(api_key, cx)` if both variables are set.
    pub fn google_credentials(&self) -> Option<(String, String)> {
        Some((
            read_env(&self.google_api_key_env)?,
            read_env(&self.google_cx_env)?,
        ))
    }

    /// Bing Web Search key if set.
    pub fn bing_key(&self) -> Option<String> {
        read_env(&self.bing_api_key_env)
    }
}

fn default_google_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_google_cx_env() -> String {
    "GOOGLE_CX".into()
}
fn default_bing_key_env() -> String {
    "BING_API_KEY".into()
}
fn default_google_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_bing_base_url() -> String {
    "https://api.bing.microsoft.com/v7.0/search".into()
}
fn default_max_results() -> u32 {
    3
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime source connector configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub sources: Vec<SourceEntry>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub user_agent: String,
}

impl From<&AppConfig> for SourceConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            sources: config.sources.clone(),
            retry: RetryPolicy::from(&config.retry),
            timeout: Duration::from_secs(config.http.timeout_secs),
            user_agent: config.http.user_agent.clone(),
        }
    }
}

/// Runtime enrichment engine configuration.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub concurrency: usize,
    pub rate_limit: Duration,
    pub run_timeout: Duration,
    pub use_source_page: bool,
    pub use_search_grounding: bool,
    pub search_snippet_fallback: bool,
    pub max_answer_words: usize,
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for EnrichmentConfig {
    fn from(config: &AppConfig) -> Self {
        let e = &config.enrichment;
        Self {
            concurrency: e.concurrency.max(1),
            rate_limit: Duration::from_millis(e.rate_limit_ms),
            run_timeout: Duration::from_secs(e.run_timeout_secs),
            use_source_page: e.use_source_page,
            use_search_grounding: e.use_search_grounding,
            search_snippet_fallback: e.search_snippet_fallback,
            max_answer_words: e.max_answer_words,
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Check structural constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(AnswerBankError::config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            match source.kind {
                SourceKind::Page if source.url.is_none() || source.selector.is_none() => {
                    return Err(AnswerBankError::config(format!(
                        "page source '{}' needs both `url` and `selector`",
                        source.name
                    )));
                }
                SourceKind::Search if source.queries.is_empty() => {
                    return Err(AnswerBankError::config(format!(
                        "search source '{}' needs at least one query",
                        source.name
                    )));
                }
                _ => {}
            }
        }

        if self.enrichment.concurrency == 0 {
            return Err(AnswerBankError::config("enrichment.concurrency must be >= 1"));
        }

        Ok(())
    }
}

/// Check that the credentials required for enrichment are present.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    config.llm.api_key().map(|_| ())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.answerbank/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AnswerBankError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the per-user config file (`~/.answerbank/answerbank.toml`).
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Find the config file to load, if any.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(AnswerBankError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }

    match default_config_path() {
        Ok(path) if path.exists() => Ok(Some(path)),
        _ => Ok(None),
    }
}

/// Load the application config. Returns defaults if no file is found.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match resolve_config_path(explicit)? {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AnswerBankError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        AnswerBankError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;

    tracing::debug!(path = %path.display(), sources = config.sources.len(), "loaded config");
    Ok(config)
}

/// Write a default config file to `path` (or the per-user location).
/// Refuses to overwrite an existing file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if path.exists() {
        return Err(AnswerBankError::config(format!(
            "config file already exists: {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AnswerBankError::io(parent, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| AnswerBankError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AnswerBankError::io(&path, e))?;
    tracing::info!(path = %path.display(), "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("questions.jsonl"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("failure_policy = \"placeholder\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(parsed.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(parsed.dataset.failure_policy, FailurePolicy::Placeholder);
        parsed.validate().expect("defaults are valid");
    }

    #[test]
    fn config_with_sources() {
        let toml_str = r#"
[dataset]
path = "/tmp/qa.jsonl"
failure_policy = "drop"

[[sources]]
name = "rust-search"
kind = "search"
queries = ["rust interview questions"]
tags = ["rust"]

[[sources]]
name = "page"
url = "https://example.com/questions"
selector = "h3"
require_question_mark = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.dataset.failure_policy, FailurePolicy::Drop);
        assert!(config.dataset.backfill_pending);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].kind, SourceKind::Search);
        assert_eq!(config.sources[1].kind, SourceKind::Page);
        assert!(!config.sources[1].require_question_mark);
        config.validate().expect("valid");
    }

    #[test]
    fn validation_rejects_incomplete_sources() {
        let mut config = AppConfig::default();
        config.sources[0].selector = None;
        assert!(config.validate().unwrap_err().to_string().contains("selector"));

        let mut config = AppConfig::default();
        config.sources[1].name = config.sources[0].name.clone();
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));

        let mut config = AppConfig::default();
        config.sources[0].kind = SourceKind::Search;
        assert!(config.validate().unwrap_err().to_string().contains("query"));
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();

        let source = SourceConfig::from(&app);
        assert_eq!(source.sources.len(), 2);
        assert_eq!(source.retry.max_attempts, 4);
        assert_eq!(source.timeout, Duration::from_secs(15));

        let enrich = EnrichmentConfig::from(&app);
        assert_eq!(enrich.concurrency, 4);
        assert_eq!(enrich.rate_limit, Duration::from_millis(1_000));
        assert_eq!(enrich.max_answer_words, 75);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "AB_TEST_NONEXISTENT_KEY_12345".into();
        let err = validate_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("AB_TEST_NONEXISTENT_KEY_12345"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let path = std::env::temp_dir().join(format!("ab-missing-{}.toml", uuid::Uuid::now_v7()));
        assert!(resolve_config_path(Some(&path)).is_err());
    }

    #[test]
    fn init_then_load() {
        let dir = std::env::temp_dir().join(format!("ab-config-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("answerbank.toml");

        let written = init_config(Some(&path)).expect("init");
        assert_eq!(written, path);
        assert!(init_config(Some(&path)).is_err(), "must not overwrite");

        let loaded = load_config(Some(&path)).expect("load");
        assert_eq!(loaded.enrichment.concurrency, 4);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
