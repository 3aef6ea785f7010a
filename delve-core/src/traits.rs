//! Collaborator trait definitions
//!
//! The research core talks to the outside world only through these two traits.

use crate::error::DelveResult;
use crate::types::*;
use async_trait::async_trait;

/// Generative-model endpoint
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one completion and return the raw response text.
    ///
    /// Throttling must surface as `DelveError::RateLimit`, bad credentials as
    /// `DelveError::Authentication`; everything else is non-retryable.
    async fn generate(&self, request: &ChatRequest) -> DelveResult<String>;

    /// Provider name for logs
    fn name(&self) -> &str {
        "chat"
    }
}

/// Web search endpoint returning page content alongside each hit
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions) -> DelveResult<SearchResponse>;

    fn name(&self) -> &str {
        "search"
    }
}
