//! Language-model backend: OpenAI-compatible chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use answerbank_shared::{AnswerBankError, HttpConfig, LlmConfig, Result};

/// Text produced by a model, with the model id that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// A chat-style language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Configured model id.
    fn model(&self) -> &str;

    /// One completion for a system + user message pair. Not retried here.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAiChat
// ---------------------------------------------------------------------------

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiChat {
    /// Build a client with an explicit API key.
    pub fn new(config: &LlmConfig, api_key: String, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs.max(30)))
            .build()
            .map_err(|e| AnswerBankError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build a client reading the key from the configured environment variable.
    pub fn from_config(config: &LlmConfig, http: &HttpConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(config, api_key, http)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnswerBankError::Network(format!("llm request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerBankError::from_status("llm", status.as_u16(), &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnswerBankError::parse(format!("llm: invalid response: {e}")))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AnswerBankError::parse("llm: response has no content"))?;

        debug!(model = %self.model, chars = text.len(), "completion received");

        Ok(Completion {
            text,
            model: body.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiChat {
        let config = LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            ..LlmConfig::default()
        };
        OpenAiChat::new(&config, "sk-test".into(), &HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn sends_chat_request_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 200,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "Q: What is GIL?\nA:"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"message": {"role": "assistant", "content": "  A global lock.  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client(&server)
            .complete("sys", "Q: What is GIL?\nA:")
            .await
            .unwrap();
        assert_eq!(completion.text, "A global lock.");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
    }

    #[tokio::test]
    async fn status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let llm = client(&server);
        let auth = llm.complete("s", "u").await.unwrap_err();
        assert!(matches!(auth, AnswerBankError::Auth(_)));
        assert!(!auth.is_transient());

        let limited = llm.complete("s", "u").await.unwrap_err();
        assert!(matches!(limited, AnswerBankError::RateLimited(_)));

        let server_error = llm.complete("s", "u").await.unwrap_err();
        assert!(server_error.is_transient());
    }

    #[tokio::test]
    async fn empty_content_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).complete("s", "u").await.unwrap_err();
        assert!(matches!(err, AnswerBankError::Parse { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_key_is_config_error() {
        let config = LlmConfig {
            api_key_env: "ANSWERBANK_TEST_MISSING_LLM_KEY".into(),
            ..LlmConfig::default()
        };
        let err = OpenAiChat::from_config(&config, &HttpConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, AnswerBankError::Config { .. }));
    }
}
