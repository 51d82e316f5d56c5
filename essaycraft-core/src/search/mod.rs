//! # Web Search Interface
//!
//! Keyword query in, ranked snippets out. The workflow only reads
//! `SearchResult::content`; title, url and score are kept for display and logs.

pub mod tavily;

pub use tavily::TavilyProvider;

use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};

/// A single ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: Option<f64>,
}

/// Pluggable search backend
#[allow(async_fn_in_trait)]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Run one query, returning at most `max_results` hits in rank order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ProviderError>;
}
