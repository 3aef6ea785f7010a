//! Query planning
//!
//! Turns a topic plus prior learnings into an ordered list of search
//! queries. Malformed or failed planning yields an empty plan, which callers
//! read as "nothing further to explore". Only fatal errors (credentials,
//! configuration) are propagated.

use super::llm::ResearchLlm;
use super::structured::parse_structured;
use delve_core::{DelveResult, ResearchQuery};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    queries: Vec<ResearchQuery>,
}

/// Research planner that breaks a topic into search queries
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    llm: ResearchLlm,
}

impl QueryPlanner {
    pub fn new(llm: ResearchLlm) -> Self {
        Self { llm }
    }

    /// Plan at most `max_queries` queries, in the order the model produced
    pub async fn plan(
        &self,
        topic: &str,
        prior_learnings: &[String],
        max_queries: usize,
    ) -> DelveResult<Vec<ResearchQuery>> {
        if max_queries == 0 {
            return Ok(Vec::new());
        }

        let prompt = self.llm.prompts().plan(topic, prior_learnings, max_queries)?;

        let raw = match self.llm.complete(prompt).await {
            Ok(raw) => raw,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Query planning failed, treating as empty plan");
                return Ok(Vec::new());
            }
        };

        let mut queries = match parse_structured::<PlanPayload>(&raw) {
            Ok(payload) => payload.queries,
            Err(e) => {
                warn!(error = %e, "Malformed plan, treating as empty plan");
                return Ok(Vec::new());
            }
        };

        queries.retain(|q| !q.query_text.trim().is_empty());
        queries.truncate(max_queries);

        info!(
            topic_chars = topic.len(),
            prior_learnings = prior_learnings.len(),
            planned = queries.len(),
            "Planned research queries"
        );
        for query in &queries {
            debug!(query = %query.query_text, goal = %query.research_goal, "Planned query");
        }

        Ok(queries)
    }
}
