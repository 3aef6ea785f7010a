//! Final report and answer synthesis
//!
//! Both operations always return a document. Model failures degrade to the
//! raw response where it is usable, otherwise to a fixed sentinel.

use super::llm::ResearchLlm;
use super::prompts::learnings_block;
use super::structured::parse_structured;
use delve_core::DelveResult;
use delve_providers::PromptTrimmer;
use serde::Deserialize;
use tracing::{info, warn};

pub const REPORT_FALLBACK: &str = "Could not generate report.";
pub const ANSWER_FALLBACK: &str = "Could not generate answer.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportPayload {
    report_markdown: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerPayload {
    exact_answer: String,
}

/// Research synthesizer for combining learnings into a document
#[derive(Debug, Clone)]
pub struct ReportSynthesizer {
    llm: ResearchLlm,
    trimmer: PromptTrimmer,
    report_budget_tokens: usize,
}

impl ReportSynthesizer {
    pub fn new(llm: ResearchLlm, trimmer: PromptTrimmer, report_budget_tokens: usize) -> Self {
        Self {
            llm,
            trimmer,
            report_budget_tokens: report_budget_tokens.max(1),
        }
    }

    /// Write the report and append a sources section listing `visited_urls`
    /// in the order given
    pub async fn synthesize(
        &self,
        topic: &str,
        learnings: &[String],
        visited_urls: &[String],
    ) -> String {
        info!(
            learnings = learnings.len(),
            sources = visited_urls.len(),
            "Synthesizing report"
        );

        let raw = match self.request(topic, learnings, Prompt::Report).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Report generation failed");
                return REPORT_FALLBACK.to_string();
            }
        };

        let body = match parse_structured::<ReportPayload>(&raw) {
            Ok(payload) if !payload.report_markdown.trim().is_empty() => payload.report_markdown,
            Ok(_) => {
                warn!("Report response was empty");
                return REPORT_FALLBACK.to_string();
            }
            Err(e) if has_heading(&raw) => {
                warn!(error = %e, "Unstructured report response, using raw markdown");
                raw
            }
            Err(e) => {
                warn!(error = %e, "Unusable report response");
                return REPORT_FALLBACK.to_string();
            }
        };

        with_sources(body, visited_urls)
    }

    /// Produce a short exact answer to `topic`
    pub async fn final_answer(&self, topic: &str, learnings: &[String]) -> String {
        info!(learnings = learnings.len(), "Synthesizing final answer");

        let raw = match self.request(topic, learnings, Prompt::Answer).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Answer generation failed");
                return ANSWER_FALLBACK.to_string();
            }
        };

        match parse_structured::<AnswerPayload>(&raw) {
            Ok(payload) if !payload.exact_answer.trim().is_empty() => {
                payload.exact_answer.trim().to_string()
            }
            _ if !raw.trim().is_empty() => {
                warn!("Unstructured answer response, using raw text");
                raw.trim().to_string()
            }
            _ => ANSWER_FALLBACK.to_string(),
        }
    }

    async fn request(&self, topic: &str, learnings: &[String], prompt: Prompt) -> DelveResult<String> {
        let block = self
            .trimmer
            .trim(&learnings_block(learnings), self.report_budget_tokens);
        let prompts = self.llm.prompts();
        let user_prompt = match prompt {
            Prompt::Report => prompts.report(topic, &block)?,
            Prompt::Answer => prompts.answer(topic, &block)?,
        };
        self.llm.complete(user_prompt).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Prompt {
    Report,
    Answer,
}

fn has_heading(text: &str) -> bool {
    text.lines().any(|line| line.trim_start().starts_with('#'))
}

/// Append `## Sources` with one bullet per URL
pub fn with_sources(body: String, urls: &[String]) -> String {
    if urls.is_empty() {
        return body;
    }
    let sources = urls
        .iter()
        .map(|url| format!("- {}", url))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n## Sources\n\n{}", body, sources)
}
