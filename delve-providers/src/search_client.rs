//! Firecrawl-style web search client
//!
//! One `POST {base_url}/search` per query, asking for markdown content of
//! each hit. Transport failures are retried here so callers never need their
//! own retry loop around search.

use crate::http::{classify_status, endpoint, retry_after_ms, transport_error};
use async_trait::async_trait;
use delve_core::{
    retry_with_policy, DelveError, DelveResult, ErrorContext, RetryPolicy, SearchConfig,
    SearchItem, SearchOptions, SearchProvider, SearchResponse,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct FirecrawlSearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    connect_timeout: Duration,
    retry_delay: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    timeout: u64,
    scrape_options: ScrapeOptions,
}

#[derive(Serialize)]
struct ScrapeOptions {
    formats: [&'static str; 1],
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    data: Vec<SearchDocument>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct SearchDocument {
    url: Option<String>,
    title: Option<String>,
    markdown: Option<String>,
}

fn default_success() -> bool {
    true
}

impl From<SearchDocument> for SearchItem {
    fn from(doc: SearchDocument) -> Self {
        SearchItem {
            url: doc.url,
            title: doc.title,
            text_content: doc.markdown,
        }
    }
}

impl FirecrawlSearchClient {
    /// The connect timeout applies to every request; the content-fetch
    /// timeout comes from each call's `SearchOptions`
    pub fn new(config: &SearchConfig) -> DelveResult<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| DelveError::Config {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client").with_operation("build_client"),
            })?;

        info!(
            base_url = %config.base_url,
            connect_timeout_ms = config.connect_timeout_ms,
            "Created search client"
        );

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            connect_timeout,
            retry_delay: Duration::from_millis(500),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Base delay between transport retries
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn search_once(&self, query: &str, options: &SearchOptions) -> DelveResult<SearchResponse> {
        let body = SearchRequest {
            query,
            limit: options.result_limit,
            timeout: options.timeout_ms,
            scrape_options: ScrapeOptions {
                formats: ["markdown"],
            },
        };

        let mut builder = self
            .http
            .post(endpoint(&self.base_url, "search"))
            .timeout(Duration::from_millis(options.fetch_timeout_ms))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error("search", "search", options.fetch_timeout_ms, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("search", "search", status, retry_after, &text));
        }

        let envelope: SearchEnvelope = response
            .json()
            .await
            .map_err(|e| transport_error("search", "search", options.fetch_timeout_ms, e))?;

        if !envelope.success {
            return Err(DelveError::Upstream {
                message: envelope
                    .error
                    .unwrap_or_else(|| "Search reported failure".to_string()),
                status: Some(status.as_u16()),
                provider: Some("firecrawl".to_string()),
                context: ErrorContext::new("search").with_operation("search"),
            });
        }

        Ok(SearchResponse {
            items: envelope.data.into_iter().map(SearchItem::from).collect(),
        })
    }
}

#[async_trait]
impl SearchProvider for FirecrawlSearchClient {
    async fn search(&self, query: &str, options: &SearchOptions) -> DelveResult<SearchResponse> {
        let started = Instant::now();
        let policy = RetryPolicy::no_jitter(options.retries, self.retry_delay, self.retry_delay * 8);

        let response = retry_with_policy(
            &policy,
            "search",
            |e| matches!(e, DelveError::Network { .. } | DelveError::Timeout { .. }),
            || self.search_once(query, options),
        )
        .await?;

        debug!(
            query = query,
            results = response.items.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Search completed"
        );

        Ok(response)
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FirecrawlSearchClient {
        FirecrawlSearchClient::new(&SearchConfig {
            base_url: server.uri(),
            api_key: Some("fc-key".to_string()),
            ..SearchConfig::default()
        })
        .unwrap()
        .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn maps_documents_to_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer fc-key"))
            .and(body_partial_json(json!({
                "query": "solid state batteries",
                "limit": 5,
                "timeout": 15000,
                "scrapeOptions": {"formats": ["markdown"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"url": "https://a.example", "title": "A", "markdown": "# A\nbody"},
                    {"url": "https://b.example", "title": "B"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .search("solid state batteries", &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.items.len(), 2);
        assert_eq!(response.urls(), vec!["https://a.example", "https://b.example"]);
        assert_eq!(response.contents(), vec!["# A\nbody"]);
    }

    #[tokio::test]
    async fn status_codes_are_classified() {
        for (status, kind) in [
            (429, "rate_limited"),
            (401, "auth"),
            (404, "not_found"),
            (503, "upstream"),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let err = client(&server)
                .search("q", &SearchOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), kind, "status {}", status);
        }
    }

    #[tokio::test]
    async fn reported_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "quota exhausted"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .search("q", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DelveError::Upstream { ref message, .. } if message == "quota exhausted"));
    }

    #[tokio::test]
    async fn fetch_timeouts_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let options = SearchOptions {
            fetch_timeout_ms: 50,
            retries: 2,
            ..SearchOptions::default()
        };
        let err = client(&server).search("q", &options).await.unwrap_err();
        assert!(matches!(err, DelveError::Timeout { .. }));
    }

    #[test]
    fn connect_timeout_comes_from_config() {
        let client = FirecrawlSearchClient::new(&SearchConfig {
            connect_timeout_ms: 750,
            ..SearchConfig::default()
        })
        .unwrap();
        assert_eq!(client.connect_timeout(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn unreachable_host_fails_within_connect_timeout() {
        // non-routable address: the connect phase never completes
        let client = FirecrawlSearchClient::new(&SearchConfig {
            base_url: "http://10.255.255.1:81".to_string(),
            connect_timeout_ms: 200,
            ..SearchConfig::default()
        })
        .unwrap();
        let options = SearchOptions {
            fetch_timeout_ms: 60_000,
            retries: 0,
            ..SearchOptions::default()
        };
        let started = Instant::now();

        let err = client.search("q", &options).await.unwrap_err();

        assert!(matches!(err, DelveError::Timeout { .. } | DelveError::Network { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
