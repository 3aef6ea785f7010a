//! Delve providers - upstream collaborators and prompt budgeting
//!
//! HTTP adapters for the generative-model and search endpoints, the
//! rate-limited executor every model call goes through, and the token-aware
//! prompt trimmer.

pub mod executor;
mod http;
pub mod llm_client;
pub mod search_client;
pub mod token_counter;
pub mod trimmer;

pub use executor::RateLimitedExecutor;
pub use llm_client::OpenAiCompatibleClient;
pub use search_client::FirecrawlSearchClient;
pub use token_counter::{TokenCounter, DEFAULT_ENCODING};
pub use trimmer::{PromptTrimmer, RecursiveTextSplitter, DEFAULT_CONTEXT_SIZE};

use delve_core::{ChatProvider, DelveConfig, DelveResult, SearchProvider};
use std::sync::Arc;

/// Build the HTTP-backed collaborators described by `config`
pub fn build_providers(
    config: &DelveConfig,
) -> DelveResult<(Arc<dyn ChatProvider>, Arc<dyn SearchProvider>)> {
    let chat: Arc<dyn ChatProvider> = Arc::new(OpenAiCompatibleClient::new(&config.llm)?);
    let search: Arc<dyn SearchProvider> = Arc::new(FirecrawlSearchClient::new(&config.search)?);
    Ok((chat, search))
}
