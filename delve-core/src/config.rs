//! Configuration management
//!
//! `DelveConfig` is built once at process start (file, then environment
//! overrides) and handed by reference to the components that need it.

use crate::async_utils::RetryPolicy;
use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::logging::LoggingConfig;
use crate::types::{ModelConfig, SearchOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub executor: ExecutorConfig,
    pub research: ResearchSettings,
    pub logging: LoggingConfig,
}

/// Generative-model endpoint (any OpenAI-compatible chat completions API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable the API key is read from
    pub api_key_env: String,
    pub temperature: Option<f32>,
    /// Context window of the model, in tokens
    pub context_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "o3-mini".to_string(),
            api_key: None,
            api_key_env: "OPENAI_KEY".to_string(),
            temperature: None,
            context_size: 128_000,
            request_timeout_secs: 180,
        }
    }
}

impl LlmConfig {
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: None,
            json_output: true,
        }
    }

    fn is_local(&self) -> bool {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .map(|host| host == "localhost" || host == "127.0.0.1" || host == "[::1]")
            .unwrap_or(false)
    }
}

/// Search endpoint (Firecrawl-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_ms: u64,
    pub result_limit: usize,
    /// Client-side bound on establishing the connection
    pub connect_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub retries: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let options = SearchOptions::default();
        Self {
            base_url: "https://api.firecrawl.dev/v1".to_string(),
            api_key: None,
            api_key_env: "FIRECRAWL_KEY".to_string(),
            timeout_ms: options.timeout_ms,
            result_limit: options.result_limit,
            connect_timeout_ms: 10_000,
            fetch_timeout_ms: options.fetch_timeout_ms,
            retries: options.retries,
        }
    }
}

impl SearchConfig {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            timeout_ms: self.timeout_ms,
            result_limit: self.result_limit,
            fetch_timeout_ms: self.fetch_timeout_ms,
            retries: self.retries,
        }
    }
}

/// Throttling and retry settings for generative-model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Permits in the process-wide limiter
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            max_retries: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 1_000,
        }
    }
}

impl ExecutorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_random_jitter(
            self.max_retries,
            self.initial_delay_ms,
            self.max_delay_ms,
            self.max_jitter_ms,
        )
    }
}

/// Budgets for the research tree and the prompts it builds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Worker pool size for sibling branches at each level
    pub concurrency: usize,
    pub learnings_per_query: usize,
    /// Token budget for each search result included in a digest prompt
    pub content_budget_tokens: usize,
    /// Token budget for the learnings included in the report prompt
    pub report_budget_tokens: usize,
    pub min_chunk_chars: usize,
    pub chunk_overlap: usize,
    pub chars_per_token: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            concurrency: 2,
            learnings_per_query: 3,
            content_budget_tokens: 25_000,
            report_budget_tokens: 150_000,
            min_chunk_chars: 2_000,
            chunk_overlap: 200,
            chars_per_token: 3,
        }
    }
}

impl DelveConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> DelveResult<Self> {
        toml::from_str(content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a file; API keys are never written
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get(&self.llm.api_key_env) {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = get("OPENAI_ENDPOINT") {
            self.llm.base_url = endpoint;
        }
        if let Some(model) = get("CUSTOM_MODEL") {
            self.llm.model = model;
        }
        if let Some(size) = get("CONTEXT_SIZE").and_then(|v| v.parse().ok()) {
            self.llm.context_size = size;
        }
        if let Some(key) = get(&self.search.api_key_env) {
            self.search.api_key = Some(key);
        }
        if let Some(url) = get("FIRECRAWL_BASE_URL") {
            self.search.base_url = url;
        }
        if let Some(concurrency) = get("DELVE_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.research.concurrency = concurrency;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> DelveResult<()> {
        for (field, url) in [
            ("llm.base_url", &self.llm.base_url),
            ("search.base_url", &self.search.base_url),
        ] {
            if Url::parse(url).is_err() {
                return Err(invalid(field, &format!("'{}' is not a valid URL", url)));
            }
        }

        let positive = [
            ("llm.context_size", self.llm.context_size),
            ("search.result_limit", self.search.result_limit),
            ("search.connect_timeout_ms", self.search.connect_timeout_ms as usize),
            ("search.fetch_timeout_ms", self.search.fetch_timeout_ms as usize),
            ("executor.max_concurrent", self.executor.max_concurrent),
            ("research.concurrency", self.research.concurrency),
            ("research.learnings_per_query", self.research.learnings_per_query),
            ("research.content_budget_tokens", self.research.content_budget_tokens),
            ("research.report_budget_tokens", self.research.report_budget_tokens),
            ("research.min_chunk_chars", self.research.min_chunk_chars),
            ("research.chars_per_token", self.research.chars_per_token),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        if self.executor.initial_delay_ms > self.executor.max_delay_ms {
            return Err(invalid(
                "executor.initial_delay_ms",
                "must not exceed executor.max_delay_ms",
            ));
        }

        Ok(())
    }

    /// Fail early when the generative-model endpoint has no credentials.
    ///
    /// Local endpoints (localhost) are allowed to run without a key.
    pub fn require_credentials(&self) -> DelveResult<()> {
        if self.llm.api_key.is_none() && !self.llm.is_local() {
            return Err(DelveError::Authentication {
                message: format!(
                    "No API key for {} (set {})",
                    self.llm.base_url, self.llm.api_key_env
                ),
                context: ErrorContext::new("config")
                    .with_operation("require_credentials")
                    .with_suggestion(&format!(
                        "Export {} or point OPENAI_ENDPOINT at a local server",
                        self.llm.api_key_env
                    )),
            });
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> DelveError {
    DelveError::Config {
        message: format!("{} {}", field, message),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_metadata("field", field)
            .with_suggestion(&format!("Fix {} in your config file", field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        DelveConfig::default().validate().unwrap();
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_KEY", "sk-test"),
            ("OPENAI_ENDPOINT", "http://localhost:1234/v1"),
            ("CUSTOM_MODEL", "local-model"),
            ("CONTEXT_SIZE", "32000"),
            ("FIRECRAWL_KEY", "fc-test"),
            ("DELVE_CONCURRENCY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = DelveConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.base_url, "http://localhost:1234/v1");
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.context_size, 32_000);
        assert_eq!(config.search.api_key.as_deref(), Some("fc-test"));
        // empty values are ignored
        assert_eq!(config.research.concurrency, 2);
    }

    #[test]
    fn missing_key_is_an_auth_error_for_hosted_endpoints() {
        let config = DelveConfig::default();
        let err = config.require_credentials().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "auth");

        let mut local = DelveConfig::default();
        local.llm.base_url = "http://localhost:11434/v1".to_string();
        local.require_credentials().unwrap();
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let mut config = DelveConfig::default();
        config.research.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = DelveConfig::default();
        config.search.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = DelveConfig::from_toml_str(
            r#"
            [research]
            concurrency = 4

            [llm]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.research.concurrency, 4);
        assert_eq!(config.research.learnings_per_query, 3);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.executor.max_retries, 5);
        assert_eq!(config.search.connect_timeout_ms, 10_000);
    }
}
