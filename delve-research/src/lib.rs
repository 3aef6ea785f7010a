//! Delve Research - recursive web research and report writing
//!
//! This crate wires the providers from `delve-providers` into the research
//! pipeline:
//!
//! - Query planning from a topic and prior learnings
//! - Bounded, recursive fan-out over search results
//! - Report and exact-answer synthesis
//! - Clarifying questions for underspecified topics
//!
//! ## Architecture
//!
//! - **Core** (delve-core): data model, errors, config, retry and limiter
//! - **Providers** (delve-providers): HTTP adapters, executor, trimmer
//! - **Research** (this crate): the research tree and its prompts
//! - **Presentation** (delve-cli): the `delve` binary

pub mod research;

pub use research::{
    continuation_query, parse_structured, ClarifyingQuestions, Digest, OutputMode, ProgressSender,
    PromptLibrary, QueryPlanner, ReportSynthesizer, ResearchEngine, ResearchLlm, ResearchProgress,
    ResultDigester, ANSWER_FALLBACK, DEFAULT_QUESTION_COUNT, REPORT_FALLBACK,
};

use delve_core::{
    ChatProvider, DelveConfig, DelveResult, LearningSet, ResearchBudget, ResearchSettings,
    SearchOptions, SearchProvider,
};
use delve_providers::{build_providers, PromptTrimmer, RateLimitedExecutor, TokenCounter};
use std::sync::Arc;
use tracing::info;

/// Top-level entry points for one configured research setup
pub struct DeepResearch {
    planner: QueryPlanner,
    digester: ResultDigester,
    synthesizer: ReportSynthesizer,
    clarifier: ClarifyingQuestions,
    search: Arc<dyn SearchProvider>,
    search_options: SearchOptions,
    settings: ResearchSettings,
    progress: Option<ProgressSender>,
}

/// Builder for DeepResearch
pub struct DeepResearchBuilder {
    config: DelveConfig,
    providers: Option<(Arc<dyn ChatProvider>, Arc<dyn SearchProvider>)>,
    progress: Option<ProgressSender>,
}

impl DeepResearchBuilder {
    pub fn new(config: &DelveConfig) -> Self {
        Self {
            config: config.clone(),
            providers: None,
            progress: None,
        }
    }

    /// Use these collaborators instead of the HTTP clients from the config
    pub fn with_providers(
        mut self,
        chat: Arc<dyn ChatProvider>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        self.providers = Some((chat, search));
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn build(self) -> DelveResult<DeepResearch> {
        let config = self.config;
        let (chat, search) = match self.providers {
            Some(providers) => providers,
            None => build_providers(&config)?,
        };

        let executor = RateLimitedExecutor::from_config(chat, &config);
        let llm = ResearchLlm::new(executor, Arc::new(PromptLibrary::new()?));
        let trimmer = PromptTrimmer::from_settings(
            TokenCounter::shared()?,
            config.llm.context_size,
            &config.research,
        );

        info!(
            model = %config.llm.model,
            max_concurrent = config.executor.max_concurrent,
            concurrency = config.research.concurrency,
            "Initialized deep research"
        );

        Ok(DeepResearch {
            planner: QueryPlanner::new(llm.clone()),
            digester: ResultDigester::new(
                llm.clone(),
                trimmer.clone(),
                config.research.content_budget_tokens,
            ),
            synthesizer: ReportSynthesizer::new(
                llm.clone(),
                trimmer,
                config.research.report_budget_tokens,
            ),
            clarifier: ClarifyingQuestions::new(llm),
            search,
            search_options: config.search.options(),
            settings: config.research,
            progress: self.progress,
        })
    }
}

impl DeepResearch {
    pub fn builder(config: &DelveConfig) -> DeepResearchBuilder {
        DeepResearchBuilder::new(config)
    }

    /// HTTP-backed research setup for `config`
    pub fn from_config(config: &DelveConfig) -> DelveResult<Self> {
        Self::builder(config).build()
    }

    /// Run the research tree for `topic`. A `depth` of 0 returns an empty
    /// set without planning.
    pub async fn run_research(
        &self,
        topic: &str,
        breadth: usize,
        depth: usize,
    ) -> DelveResult<LearningSet> {
        let budget = ResearchBudget::new(breadth, depth);
        let mut engine = ResearchEngine::new(
            self.planner.clone(),
            self.digester.clone(),
            Arc::clone(&self.search),
            self.search_options.clone(),
            &self.settings,
        );
        if let Some(sender) = &self.progress {
            engine = engine.with_progress(sender.clone());
        }

        Arc::new(engine).run(topic, budget).await
    }

    pub async fn build_report(&self, topic: &str, learnings: &[String], urls: &[String]) -> String {
        self.synthesizer.synthesize(topic, learnings, urls).await
    }

    pub async fn final_answer(&self, topic: &str, learnings: &[String]) -> String {
        self.synthesizer.final_answer(topic, learnings).await
    }

    pub async fn clarifying_questions(&self, topic: &str, count: usize) -> DelveResult<Vec<String>> {
        self.clarifier.generate(topic, count).await
    }
}
