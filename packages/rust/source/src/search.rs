//! Web search backends (Google Custom Search, Bing Web Search).
//!
//! Both are used twice: as a question source (result titles) and as grounding
//! or fallback material for answers (result snippets).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use answerbank_shared::{AnswerBankError, Result, SearchConfig};

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// A web search provider.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Provider name recorded in logs (`google`, `bing`).
    fn name(&self) -> &str;

    /// Run `query`, returning at most `limit` hits in rank order.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>>;
}

/// Build every backend whose credentials are present, Google first.
pub fn backends_from_config(config: &SearchConfig, client: &Client) -> Vec<Arc<dyn SearchBackend>> {
    let mut backends: Vec<Arc<dyn SearchBackend>> = Vec::new();

    if let Some((api_key, cx)) = config.google_credentials() {
        backends.push(Arc::new(GoogleSearch::new(
            client.clone(),
            &config.google_base_url,
            api_key,
            cx,
        )));
    }
    if let Some(key) = config.bing_key() {
        backends.push(Arc::new(BingSearch::new(
            client.clone(),
            &config.bing_base_url,
            key,
        )));
    }

    debug!(count = backends.len(), "search backends configured");
    backends
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    context: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AnswerBankError::from_status(context, status.as_u16(), &body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AnswerBankError::parse(format!("{context}: invalid response: {e}")))
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

pub struct GoogleSearch {
    client: Client,
    base_url: String,
    api_key: String,
    cx: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

impl GoogleSearch {
    pub fn new(client: Client, base_url: &str, api_key: String, cx: String) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key,
            cx,
        }
    }
}

#[async_trait]
impl SearchBackend for GoogleSearch {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
        // The API caps `num` at 10.
        let num = limit.clamp(1, 10).to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AnswerBankError::Network(format!("google search: {e}")))?;

        let body: GoogleResponse = read_json("google search", response).await?;
        Ok(body
            .items
            .into_iter()
            .take(limit as usize)
            .map(|item| SearchHit {
                title: item.title,
                snippet: item.snippet,
                url: item.link,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Bing Web Search
// ---------------------------------------------------------------------------

pub struct BingSearch {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct BingResponse {
    #[serde(rename = "webPages")]
    web_pages: Option<BingWebPages>,
}

#[derive(Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingItem>,
}

#[derive(Deserialize)]
struct BingItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    url: String,
}

impl BingSearch {
    pub fn new(client: Client, base_url: &str, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SearchBackend for BingSearch {
    fn name(&self) -> &str {
        "bing"
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
        let count = limit.max(1).to_string();
        let response = self
            .client
            .get(&self.base_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| AnswerBankError::Network(format!("bing search: {e}")))?;

        let body: BingResponse = read_json("bing search", response).await?;
        Ok(body
            .web_pages
            .map(|pages| pages.value)
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .map(|item| SearchHit {
                title: item.name,
                snippet: item.snippet,
                url: item.url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn google_maps_items_to_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("key", "k"))
            .and(query_param("cx", "c"))
            .and(query_param("q", "what is rust"))
            .and(query_param("num", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"title": "What is Rust?", "snippet": "A systems language.", "link": "https://a.example/"},
                    {"title": "Rust book", "snippet": "Learn Rust.", "link": "https://b.example/"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let google = GoogleSearch::new(
            Client::new(),
            &format!("{}/customsearch/v1", server.uri()),
            "k".into(),
            "c".into(),
        );
        let hits = google.search("what is rust", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "What is Rust?");
        assert_eq!(hits[0].snippet, "A systems language.");
        assert_eq!(hits[1].url, "https://b.example/");
    }

    #[tokio::test]
    async fn google_without_items_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let google = GoogleSearch::new(Client::new(), &server.uri(), "k".into(), "c".into());
        assert!(google.search("nothing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bing_sends_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v7.0/search"))
            .and(header("Ocp-Apim-Subscription-Key", "secret"))
            .and(query_param("q", "sql joins"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "webPages": {"value": [
                    {"name": "SQL joins explained", "snippet": "Joins combine rows.", "url": "https://c.example/"}
                ]}
            })))
            .mount(&server)
            .await;

        let bing = BingSearch::new(
            Client::new(),
            &format!("{}/v7.0/search", server.uri()),
            "secret".into(),
        );
        let hits = bing.search("sql joins", 3).await.unwrap();
        assert_eq!(
            hits,
            vec![SearchHit {
                title: "SQL joins explained".into(),
                snippet: "Joins combine rows.".into(),
                url: "https://c.example/".into(),
            }]
        );
    }

    #[tokio::test]
    async fn auth_and_rate_limit_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "limited"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "denied"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let bing = BingSearch::new(Client::new(), &server.uri(), "bad".into());

        let limited = bing.search("limited", 1).await.unwrap_err();
        assert!(matches!(limited, AnswerBankError::RateLimited(_)));
        assert!(limited.is_transient());

        let denied = bing.search("denied", 1).await.unwrap_err();
        assert!(matches!(denied, AnswerBankError::Auth(_)));
        assert!(!denied.is_transient());
    }
}
