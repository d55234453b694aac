//! Core domain types for the answerbank dataset.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest of a question.
const ID_HEX_LEN: usize = 16;

/// Current UTC time truncated to whole seconds.
///
/// Every timestamp that lands in the dataset goes through here so the
/// serialized form never carries sub-second noise.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

// ---------------------------------------------------------------------------
// QuestionId
// ---------------------------------------------------------------------------

/// Stable identifier derived from the normalized question text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

impl QuestionId {
    /// Hash the normalized form of `text` into an identifier.
    pub fn from_text(text: &str) -> Self {
        let normalized = normalize_question(text);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..ID_HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize question text for identity comparison.
///
/// Lowercases, collapses whitespace runs into single spaces, trims, and
/// removes whitespace immediately before a question mark.
pub fn normalize_question(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase().replace(" ?", "?")
}

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

/// Where a question came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMeta {
    /// Configured source name (e.g. `interviewbit-data-science`).
    pub origin: String,
    /// Page the question was scraped from, used for answer extraction.
    pub link: Option<String>,
    /// When the question was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Tags copied from the source configuration.
    pub tags: Vec<String>,
}

/// A question candidate. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    /// Raw question text as scraped (whitespace collapsed).
    pub text: String,
    pub source: SourceMeta,
}

impl Question {
    /// Build a question, deriving its identifier from the text.
    pub fn new(text: &str, source: SourceMeta) -> Self {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            id: QuestionId::from_text(&text),
            text,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// Which backend produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMethod {
    /// Extracted from the question's source page.
    SourcePage,
    /// Top snippet from a web search backend.
    SearchSnippet,
    /// Generated by the language model.
    Llm,
}

impl AnswerMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourcePage => "source_page",
            Self::SearchSnippet => "search_snippet",
            Self::Llm => "llm",
        }
    }
}

/// A generated answer and its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub method: AnswerMethod,
    /// Model id (LLM), backend name (search), or adapter name (source page).
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// Number of retries spent before the answer was obtained.
    pub retries: u32,
}

// ---------------------------------------------------------------------------
// DatasetRecord
// ---------------------------------------------------------------------------

/// One line of the durable dataset.
///
/// Field order here is the on-disk field order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: QuestionId,
    pub question: String,
    pub origin: String,
    pub link: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `None` while the question is pending an answer.
    pub answer: Option<Answer>,
}

impl DatasetRecord {
    pub fn new(question: Question, answer: Option<Answer>) -> Self {
        Self {
            id: question.id,
            question: question.text,
            origin: question.source.origin,
            link: question.source.link,
            fetched_at: question.source.fetched_at,
            tags: question.source.tags,
            answer,
        }
    }

    /// Reconstruct the question this record was created from.
    pub fn to_question(&self) -> Question {
        Question {
            id: self.id.clone(),
            text: self.question.clone(),
            source: SourceMeta {
                origin: self.origin.clone(),
                link: self.link.clone(),
                fetched_at: self.fetched_at,
                tags: self.tags.clone(),
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.answer.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> SourceMeta {
        SourceMeta {
            origin: "test".into(),
            link: Some("https://example.com/q".into()),
            fetched_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            tags: vec!["python".into()],
        }
    }

    #[test]
    fn normalization_ignores_case_and_spacing() {
        assert_eq!(
            normalize_question("  What is   a\tDecorator ?\n"),
            "what is a decorator?"
        );
    }

    #[test]
    fn id_is_stable_across_formatting() {
        let a = QuestionId::from_text("What is a closure?");
        let b = QuestionId::from_text("what  is a CLOSURE ?");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);

        let c = QuestionId::from_text("What is a generator?");
        assert_ne!(a, c);
    }

    #[test]
    fn question_collapses_whitespace_but_keeps_case() {
        let q = Question::new("What   is\nPEP 8?", meta());
        assert_eq!(q.text, "What is PEP 8?");
        assert_eq!(q.id, QuestionId::from_text("what is pep 8?"));
    }

    #[test]
    fn record_roundtrips_question() {
        let q = Question::new("What is GIL?", meta());
        let record = DatasetRecord::new(q.clone(), None);
        assert!(record.is_pending());
        assert_eq!(record.to_question(), q);
    }

    #[test]
    fn record_serializes_in_fixed_field_order() {
        let q = Question::new("What is GIL?", meta());
        let record = DatasetRecord::new(q, None);
        let json = serde_json::to_string(&record).unwrap();

        let positions: Vec<usize> = [
            "\"id\"",
            "\"question\"",
            "\"origin\"",
            "\"link\"",
            "\"fetched_at\"",
            "\"tags\"",
            "\"answer\"",
        ]
        .iter()
        .map(|key| json.find(key).expect("field present"))
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains(r#""fetched_at":"2025-01-02T03:04:05Z""#));
        assert!(json.ends_with(r#""answer":null}"#));
    }

    #[test]
    fn answer_method_serializes_snake_case() {
        let json = serde_json::to_string(&AnswerMethod::SourcePage).unwrap();
        assert_eq!(json, r#""source_page""#);
        assert_eq!(AnswerMethod::SearchSnippet.as_str(), "search_snippet");
    }

    #[test]
    fn now_has_no_subsecond_part() {
        use chrono::Timelike;
        assert_eq!(now_utc().nanosecond(), 0);
    }
}
