//! Stub collaborators shared by the research tests

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::{
    ChatProvider, ChatRequest, DelveConfig, DelveError, DelveResult, ErrorContext, SearchItem,
    SearchOptions, SearchProvider, SearchResponse,
};
use delve_research::DeepResearch;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ChatScript = dyn Fn(&str) -> DelveResult<String> + Send + Sync;
type SearchScript = dyn Fn(&str) -> DelveResult<SearchResponse> + Send + Sync;

/// Mock model that answers according to a script keyed on the user prompt
pub struct MockLlmClient {
    script: Box<ChatScript>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(script: impl Fn(&str) -> DelveResult<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Mock that always returns `text`
    pub fn always(text: &str) -> Arc<Self> {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatProvider for MockLlmClient {
    async fn generate(&self, request: &ChatRequest) -> DelveResult<String> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        (self.script)(&prompt)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock search engine with per-query scripted results
pub struct MockSearch {
    script: Box<SearchScript>,
    queries: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockSearch {
    pub fn new(
        script: impl Fn(&str) -> DelveResult<SearchResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, script)
    }

    pub fn with_delay(
        delay: Duration,
        script: impl Fn(&str) -> DelveResult<SearchResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            queries: Mutex::new(Vec::new()),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, _options: &SearchOptions) -> DelveResult<SearchResponse> {
        self.queries.lock().unwrap().push(query.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(query)
    }

    fn name(&self) -> &str {
        "mock-search"
    }
}

pub fn page(url: &str, content: &str) -> SearchItem {
    SearchItem {
        url: Some(url.to_string()),
        title: None,
        text_content: Some(content.to_string()),
    }
}

pub fn results(items: Vec<SearchItem>) -> DelveResult<SearchResponse> {
    Ok(SearchResponse { items })
}

pub fn network_error() -> DelveError {
    DelveError::Network {
        message: "connection reset".to_string(),
        source: None,
        context: ErrorContext::new("mock-search"),
    }
}

pub fn auth_error() -> DelveError {
    DelveError::Authentication {
        message: "invalid api key".to_string(),
        context: ErrorContext::new("mock"),
    }
}

pub fn is_plan(prompt: &str) -> bool {
    prompt.starts_with("Produce web search queries")
}

pub fn is_digest(prompt: &str) -> bool {
    prompt.starts_with("Below are the contents returned by a web search")
}

/// Text between `<topic>` tags
pub fn topic_of(prompt: &str) -> &str {
    between(prompt, "<topic>\n", "\n</topic>")
}

/// Text between `<query>` tags
pub fn query_of(prompt: &str) -> &str {
    between(prompt, "<query>", "</query>")
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    text.split_once(start)
        .and_then(|(_, rest)| rest.split_once(end))
        .map(|(inner, _)| inner)
        .unwrap_or("")
}

pub fn plan_json(queries: &[(&str, &str)]) -> String {
    let queries: Vec<_> = queries
        .iter()
        .map(|(query, goal)| serde_json::json!({"query": query, "researchGoal": goal}))
        .collect();
    serde_json::json!({ "queries": queries }).to_string()
}

pub fn digest_json(learnings: &[&str], follow_ups: &[&str]) -> String {
    serde_json::json!({"learnings": learnings, "followUpQuestions": follow_ups}).to_string()
}

pub fn research_with(chat: Arc<MockLlmClient>, search: Arc<MockSearch>) -> DeepResearch {
    research_with_config(&DelveConfig::default(), chat, search)
}

pub fn research_with_config(
    config: &DelveConfig,
    chat: Arc<MockLlmClient>,
    search: Arc<MockSearch>,
) -> DeepResearch {
    DeepResearch::builder(config)
        .with_providers(chat, search)
        .build()
        .unwrap()
}

pub fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}
