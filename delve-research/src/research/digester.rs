//! Result digestion
//!
//! Condenses one query's search results into learnings and follow-up
//! questions. An unparseable response yields a degraded, empty digest
//! instead of an error.

use super::llm::ResearchLlm;
use super::structured::parse_structured;
use super::types::Digest;
use delve_core::{DelveResult, SearchResponse};
use delve_providers::PromptTrimmer;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DigestPayload {
    #[serde(default)]
    learnings: Vec<String>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResultDigester {
    llm: ResearchLlm,
    trimmer: PromptTrimmer,
    /// Token budget for each search result
    content_budget_tokens: usize,
}

impl ResultDigester {
    pub fn new(llm: ResearchLlm, trimmer: PromptTrimmer, content_budget_tokens: usize) -> Self {
        Self {
            llm,
            trimmer,
            content_budget_tokens: content_budget_tokens.max(1),
        }
    }

    /// Digest `results` for `query`.
    ///
    /// Errors only when the model call itself fails.
    pub async fn digest(
        &self,
        query: &str,
        results: &SearchResponse,
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> DelveResult<Digest> {
        let contents: Vec<String> = results
            .contents()
            .into_iter()
            .map(|content| self.trimmer.trim(content, self.content_budget_tokens))
            .collect();

        if contents.is_empty() {
            debug!(query = query, "No content to digest");
            return Ok(Digest::default());
        }

        let prompt = self
            .llm
            .prompts()
            .digest(query, &contents, max_learnings, max_follow_ups)?;
        let raw = self.llm.complete(prompt).await?;

        let payload = match parse_structured::<DigestPayload>(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(query = query, error = %e, "Malformed digest, dropping branch output");
                return Ok(Digest::degraded());
            }
        };

        let digest = Digest {
            learnings: non_empty(payload.learnings, max_learnings),
            follow_up_questions: non_empty(payload.follow_up_questions, max_follow_ups),
            degraded: false,
        };

        debug!(
            query = query,
            contents = contents.len(),
            learnings = digest.learnings.len(),
            follow_ups = digest.follow_up_questions.len(),
            "Digested search results"
        );

        Ok(digest)
    }
}

fn non_empty(items: Vec<String>, max: usize) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .take(max)
        .collect()
}
