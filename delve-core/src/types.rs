//! Core data type definitions

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One planned search query together with the intent behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchQuery {
    #[serde(alias = "query")]
    pub query_text: String,
    #[serde(default)]
    pub research_goal: String,
}

impl ResearchQuery {
    pub fn new(query_text: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            research_goal: research_goal.into(),
        }
    }
}

/// Learnings and visited URLs accumulated over a research tree.
///
/// Both sequences are duplicate-free. Insertion order is kept for display but
/// carries no meaning: sibling branches complete in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSet {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl LearningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary input, dropping duplicates
    pub fn from_parts(
        learnings: impl IntoIterator<Item = String>,
        visited_urls: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut set = Self::default();
        set.add_learnings(learnings);
        set.add_urls(visited_urls);
        set
    }

    pub fn is_empty(&self) -> bool {
        self.learnings.is_empty() && self.visited_urls.is_empty()
    }

    pub fn add_learnings(&mut self, learnings: impl IntoIterator<Item = String>) {
        extend_unique(&mut self.learnings, learnings);
    }

    pub fn add_urls(&mut self, urls: impl IntoIterator<Item = String>) {
        extend_unique(&mut self.visited_urls, urls);
    }

    /// Union another set into this one (exact string match)
    pub fn merge(&mut self, other: LearningSet) {
        self.add_learnings(other.learnings);
        self.add_urls(other.visited_urls);
    }

    /// New snapshot containing this set plus the given additions
    pub fn with_additions(
        &self,
        learnings: impl IntoIterator<Item = String>,
        urls: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut next = self.clone();
        next.add_learnings(learnings);
        next.add_urls(urls);
        next
    }
}

fn extend_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    for item in items {
        if seen.insert(item.clone()) {
            target.push(item);
        }
    }
}

/// Breadth/depth budget of one recursion level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBudget {
    pub breadth: usize,
    pub depth: usize,
}

impl ResearchBudget {
    /// Breadth is clamped to at least 1
    pub fn new(breadth: usize, depth: usize) -> Self {
        Self {
            breadth: breadth.max(1),
            depth,
        }
    }

    /// Budget handed to children: `ceil(breadth / 2)` (never 0) and `depth - 1`
    pub fn next(&self) -> Self {
        Self {
            breadth: self.breadth.div_ceil(2).max(1),
            depth: self.depth.saturating_sub(1),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.depth == 0
    }
}

/// Options handed to the search collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Provider-side search timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum number of results
    pub result_limit: usize,
    /// Client-side timeout for fetching the result content
    pub fetch_timeout_ms: u64,
    /// Retries for transport failures, performed by the collaborator
    pub retries: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            result_limit: 5,
            fetch_timeout_ms: 30_000,
            retries: 2,
        }
    }
}

/// A single search hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub url: Option<String>,
    pub title: Option<String>,
    pub text_content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub items: Vec<SearchItem>,
}

impl SearchResponse {
    /// Non-empty URLs in result order
    pub fn urls(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| item.url.as_deref())
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Non-empty content fields in result order
    pub fn contents(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| item.text_content.as_deref())
            .filter(|content| !content.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Model selection and sampling options for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response
    pub json_output: bool,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            json_output: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: ModelConfig,
}
