//! Recursive research orchestrator
//!
//! Each level plans queries for the current topic, then fans out over them
//! on a bounded worker pool. Every branch searches, digests the results and
//! either recurses with a halved breadth and one less depth, or returns its
//! snapshot as a leaf. A failing branch contributes nothing; the rest of the
//! tree carries on.

use super::digester::ResultDigester;
use super::planner::QueryPlanner;
use super::types::{Digest, ProgressSender, ResearchProgress};
use delve_core::{
    log_operation_start, log_operation_success, parse_error, process_concurrently, DelveResult,
    LearningSet, ResearchBudget, ResearchQuery, ResearchSettings, SearchOptions, SearchProvider,
};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Deep research engine for multi-level web investigations
pub struct ResearchEngine {
    planner: QueryPlanner,
    digester: ResultDigester,
    search: Arc<dyn SearchProvider>,
    search_options: SearchOptions,
    /// Worker pool size for sibling branches
    concurrency: usize,
    learnings_per_query: usize,
    progress: Option<ProgressSender>,
}

impl ResearchEngine {
    pub fn new(
        planner: QueryPlanner,
        digester: ResultDigester,
        search: Arc<dyn SearchProvider>,
        search_options: SearchOptions,
        settings: &ResearchSettings,
    ) -> Self {
        Self {
            planner,
            digester,
            search,
            search_options,
            concurrency: settings.concurrency.max(1),
            learnings_per_query: settings.learnings_per_query.max(1),
            progress: None,
        }
    }

    /// Send progress events to `sender`
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Research `topic` from scratch
    pub async fn run(self: &Arc<Self>, topic: &str, budget: ResearchBudget) -> DelveResult<LearningSet> {
        log_operation_start!("research", breadth = budget.breadth, depth = budget.depth);

        let result = self.research(topic, budget, LearningSet::new()).await?;

        log_operation_success!(
            "research",
            learnings = result.learnings.len(),
            urls = result.visited_urls.len()
        );
        Ok(result)
    }

    /// Research `query` under `budget`, building on `accumulated`.
    ///
    /// The result is `accumulated` united with every branch result. Only a
    /// fatal planning error at this level is returned as an error.
    pub async fn research(
        self: &Arc<Self>,
        query: &str,
        budget: ResearchBudget,
        accumulated: LearningSet,
    ) -> DelveResult<LearningSet> {
        research_level(Arc::clone(self), query.to_string(), budget, accumulated).await
    }

    fn emit(&self, event: ResearchProgress) {
        if let Some(sender) = &self.progress {
            // receiver gone means nobody is watching
            let _ = sender.send(event);
        }
    }

    async fn run_branch(
        self: Arc<Self>,
        planned: ResearchQuery,
        budget: ResearchBudget,
        accumulated: LearningSet,
    ) -> DelveResult<LearningSet> {
        self.emit(ResearchProgress::QueryStarted {
            depth: budget.depth,
            query: planned.query_text.clone(),
        });

        match self.explore(&planned, budget, accumulated).await {
            Ok(result) => {
                self.emit(ResearchProgress::QueryCompleted {
                    depth: budget.depth,
                    query: planned.query_text.clone(),
                    learnings: result.learnings.len(),
                    urls: result.visited_urls.len(),
                });
                Ok(result)
            }
            Err(e) => {
                warn!(
                    query = %planned.query_text,
                    depth = budget.depth,
                    kind = e.kind(),
                    error = %e,
                    "Research branch failed, contributing nothing"
                );
                self.emit(ResearchProgress::QueryFailed {
                    depth: budget.depth,
                    query: planned.query_text,
                    kind: e.kind().to_string(),
                });
                Ok(LearningSet::new())
            }
        }
    }

    async fn explore(
        self: &Arc<Self>,
        planned: &ResearchQuery,
        budget: ResearchBudget,
        accumulated: LearningSet,
    ) -> DelveResult<LearningSet> {
        let response = self
            .search
            .search(&planned.query_text, &self.search_options)
            .await?;
        let urls = response.urls();
        let next = budget.next();

        let Digest {
            learnings,
            follow_up_questions,
            degraded,
        } = self
            .digester
            .digest(
                &planned.query_text,
                &response,
                self.learnings_per_query,
                next.breadth,
            )
            .await?;

        if degraded {
            return Err(parse_error!(
                format!("Digest for '{}' could not be parsed", planned.query_text),
                "engine"
            ));
        }

        debug!(
            query = %planned.query_text,
            learnings = learnings.len(),
            urls = urls.len(),
            "Branch digested"
        );

        let snapshot = accumulated.with_additions(learnings, urls);

        if next.is_exhausted() {
            return Ok(snapshot);
        }

        let continuation = continuation_query(&planned.research_goal, &follow_up_questions);
        research_level(Arc::clone(self), continuation, next, snapshot).await
    }
}

fn research_level(
    engine: Arc<ResearchEngine>,
    query: String,
    budget: ResearchBudget,
    accumulated: LearningSet,
) -> BoxFuture<'static, DelveResult<LearningSet>> {
    async move {
        if budget.is_exhausted() {
            debug!("Depth budget exhausted, nothing to plan");
            return Ok(accumulated);
        }

        let queries = engine
            .planner
            .plan(&query, &accumulated.learnings, budget.breadth)
            .await?;

        engine.emit(ResearchProgress::Planned {
            depth: budget.depth,
            queries: queries.iter().map(|q| q.query_text.clone()).collect(),
        });

        if queries.is_empty() {
            info!(depth = budget.depth, "No queries planned, stopping at this level");
            return Ok(accumulated);
        }

        let branch_results = process_concurrently(queries, engine.concurrency, {
            let engine = Arc::clone(&engine);
            let accumulated = accumulated.clone();
            move |planned: ResearchQuery| {
                let engine = Arc::clone(&engine);
                let accumulated = accumulated.clone();
                async move { engine.run_branch(planned, budget, accumulated).await }
            }
        })
        .await;

        let mut merged = accumulated;
        for result in branch_results {
            match result {
                Ok(set) => merged.merge(set),
                Err(e) => warn!(
                    depth = budget.depth,
                    kind = e.kind(),
                    error = %e,
                    "Research branch aborted, contributing nothing"
                ),
            }
        }

        Ok(merged)
    }
    .boxed()
}

/// Topic for the next level: the branch goal followed by its follow-ups
pub fn continuation_query(research_goal: &str, follow_up_questions: &[String]) -> String {
    let directions: String = follow_up_questions
        .iter()
        .map(|question| format!("\n{}", question))
        .collect();

    format!(
        "Previous research goal: {}\nFollow-up research directions: {}",
        research_goal, directions
    )
    .trim()
    .to_string()
}
