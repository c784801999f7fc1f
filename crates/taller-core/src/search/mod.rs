//! Web search through SerpAPI's Google engine

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::Error;

/// One organic result, in upstream rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub link: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<SearchResult>,
    error: Option<String>,
}

pub struct SerpApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SerpApiClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Run a query and return at most `num_results` organic results.
    ///
    /// Without an API key this fails before touching the network.
    pub async fn search(&self, query: &str, num_results: u32) -> Result<Vec<SearchResult>, Error> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::Config("SERPAPI_KEY is not set; web search is unavailable".to_string())
        })?;

        info!(%query, num_results, "Running web search");

        let url = format!("{}/search.json", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", &num_results.to_string()),
                ("api_key", api_key),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Search request failed: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to read search response: {}", e)))?;

        let parsed: Option<SearchResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| body.trim().to_string());
            return Err(Error::Upstream(format!("SerpAPI error {}: {}", status.as_u16(), detail)));
        }

        let parsed = parsed
            .ok_or_else(|| Error::Upstream("SerpAPI returned an unreadable response".to_string()))?;

        if let Some(error) = parsed.error {
            // "Google hasn't returned any results for this query." is not a failure.
            if parsed.organic_results.is_empty() && error.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(Error::Upstream(format!("SerpAPI error: {}", error)));
        }

        let mut results = parsed.organic_results;
        results.truncate(num_results as usize);
        debug!("Search returned {} results", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn organic(n: usize) -> Vec<serde_json::Value> {
        (1..=n)
            .map(|i| {
                json!({
                    "position": i,
                    "title": format!("Result {}", i),
                    "link": format!("https://example.com/{}", i),
                    "snippet": format!("Snippet {}", i),
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SerpApiClient::new(reqwest::Client::new(), &server.uri(), None);
        let err = client.search("rust", 3).await.unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("SERPAPI_KEY")));
    }

    #[tokio::test]
    async fn test_results_truncated_in_upstream_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("engine", "google"))
            .and(query_param("q", "rust async"))
            .and(query_param("num", "3"))
            .and(query_param("api_key", "k-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "search_metadata": {"status": "Success"},
                "organic_results": organic(5)
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SerpApiClient::new(reqwest::Client::new(), &server.uri(), Some("k-1".to_string()));
        let results = client.search("rust async", 3).await.unwrap();

        assert_eq!(results.len(), 3);
        let titles: Vec<_> = results.iter().map(|r| r.title.as_deref().unwrap()).collect();
        assert_eq!(titles, vec!["Result 1", "Result 2", "Result 3"]);
        assert_eq!(results[0].link.as_deref(), Some("https://example.com/1"));
    }

    #[tokio::test]
    async fn test_missing_fields_are_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic_results": [{"title": "Only title"}]
            })))
            .mount(&server)
            .await;

        let client = SerpApiClient::new(reqwest::Client::new(), &server.uri(), Some("k".to_string()));
        let results = client.search("q", 10).await.unwrap();
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([{"title": "Only title", "snippet": null, "link": null}])
        );
    }

    #[tokio::test]
    async fn test_no_results_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "Google hasn't returned any results for this query."
            })))
            .mount(&server)
            .await;

        let client = SerpApiClient::new(reqwest::Client::new(), &server.uri(), Some("k".to_string()));
        assert!(client.search("zxqv", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_key_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "Invalid API key. Your API key should be here: https://serpapi.com/manage-api-key"
            })))
            .mount(&server)
            .await;

        let client = SerpApiClient::new(reqwest::Client::new(), &server.uri(), Some("bad".to_string()));
        let err = client.search("q", 1).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(ref m) if m.contains("401") && m.contains("Invalid API key")));
    }
}
