//! Shared HTTP fetching with status classification and SSRF protection.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use answerbank_shared::{AnswerBankError, Result};

/// Thin wrapper around a [`reqwest::Client`] used for HTML pages.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private: bool,
}

impl HttpFetcher {
    /// Build a client with the given user agent and per-request timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| AnswerBankError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_private: false,
        })
    }

    /// Allow fetching localhost/private addresses (mock servers in tests).
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private = true;
        self
    }

    /// The underlying client, shared with the search backends.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url` and return the body text.
    ///
    /// Non-success statuses are mapped through [`AnswerBankError::from_status`]
    /// so the caller's retry policy can tell transient from permanent.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        if !self.allow_private && is_ssrf_target(url) {
            return Err(AnswerBankError::validation(format!(
                "refusing to fetch blocked address: {url}"
            )));
        }

        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| AnswerBankError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerBankError::from_status(
                url.as_str(),
                status.as_u16(),
                &body,
            ));
        }

        response
            .text()
            .await
            .map_err(|e| AnswerBankError::Network(format!("{url}: body read failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub(crate) fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn ssrf_blocks_non_http_schemes() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn ssrf_blocks_private_and_loopback() {
        for raw in [
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "http://localhost:3000/api",
            "http://metadata.internal/",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn ssrf_allows_public_hosts() {
        let url = Url::parse("https://www.interviewbit.com/sql-interview-questions/").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[tokio::test]
    async fn blocked_address_is_rejected_without_request() {
        let fetcher = HttpFetcher::new("test", Duration::from_secs(2)).unwrap();
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let err = fetcher.get_text(&url).await.unwrap_err();
        assert!(matches!(err, AnswerBankError::Validation { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn status_codes_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("test", Duration::from_secs(2))
            .unwrap()
            .allow_private_hosts();
        let base = Url::parse(&server.uri()).unwrap();

        let busy = fetcher.get_text(&base.join("/busy").unwrap()).await;
        assert!(busy.unwrap_err().is_transient());

        let gone = fetcher.get_text(&base.join("/gone").unwrap()).await;
        assert!(!gone.unwrap_err().is_transient());

        let ok = fetcher.get_text(&base.join("/ok").unwrap()).await.unwrap();
        assert_eq!(ok, "<p>hi</p>");
    }
}
