//! Model access for the research steps

use super::prompts::PromptLibrary;
use chrono::Utc;
use delve_core::{ChatMessage, DelveResult};
use delve_providers::RateLimitedExecutor;
use std::sync::Arc;

/// Executor plus prompt library; every call is system prompt + one user turn
#[derive(Debug, Clone)]
pub struct ResearchLlm {
    executor: RateLimitedExecutor,
    prompts: Arc<PromptLibrary>,
}

impl ResearchLlm {
    pub fn new(executor: RateLimitedExecutor, prompts: Arc<PromptLibrary>) -> Self {
        Self { executor, prompts }
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    /// Send `user_prompt` and return the raw response text
    pub async fn complete(&self, user_prompt: String) -> DelveResult<String> {
        let system = self.prompts.system_prompt(Utc::now())?;
        self.executor
            .execute(vec![ChatMessage::system(system), ChatMessage::user(user_prompt)])
            .await
    }
}
