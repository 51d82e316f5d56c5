//! Tavily search provider

use super::*;
use crate::provider::send_checked;
use reqwest::Client;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Tavily search provider (requires API key)
pub struct TavilyProvider {
    client: Client,
    api_key: String,
    url: String,
}

impl TavilyProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("Tavily requires an API key".into()));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            url: TAVILY_SEARCH_URL.to_string(),
        })
    }

    /// Point at a different endpoint (proxies, test servers)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl SearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ProviderError> {
        // Strip control characters models sometimes emit
        let query: String = query
            .chars()
            .filter(|c| !c.is_control() || *c == ' ')
            .collect();

        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
            "include_answer": false,
        });

        tracing::debug!(query = %query, max_results, "tavily search");

        let response = send_checked(self.client.post(&self.url).json(&body)).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut results = parse_results(&data)?;
        results.truncate(max_results);
        Ok(results)
    }
}

/// Extract hits from a Tavily response body
fn parse_results(data: &serde_json::Value) -> Result<Vec<SearchResult>, ProviderError> {
    let items = data
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| ProviderError::Parse("missing 'results' array".into()))?;

    Ok(items
        .iter()
        .map(|item| SearchResult {
            title: item.get("title").and_then(|t| t.as_str()).unwrap_or("").to_string(),
            url: item.get("url").and_then(|u| u.as_str()).unwrap_or("").to_string(),
            content: item.get("content").and_then(|c| c.as_str()).unwrap_or("").to_string(),
            score: item.get("score").and_then(|s| s.as_f64()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results() {
        let body = serde_json::json!({
            "query": "rust borrow checker",
            "results": [
                { "title": "Borrowing", "url": "https://doc.rust-lang.org", "content": "References and borrowing", "score": 0.91 },
                { "title": "NLL", "url": "https://blog.rust-lang.org", "content": "Non-lexical lifetimes" }
            ]
        });

        let results = parse_results(&body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "References and borrowing");
        assert_eq!(results[0].score, Some(0.91));
        assert_eq!(results[1].score, None);
    }

    #[test]
    fn test_parse_results_requires_array() {
        let err = parse_results(&serde_json::json!({ "detail": "bad key" })).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));

        let empty = parse_results(&serde_json::json!({ "results": [] })).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            TavilyProvider::new("  "),
            Err(ProviderError::InvalidRequest(_))
        ));
        let provider = TavilyProvider::new("tvly-key").unwrap().with_url("http://localhost:9/search");
        assert_eq!(provider.url, "http://localhost:9/search");
    }
}
