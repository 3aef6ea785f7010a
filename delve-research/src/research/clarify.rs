//! Clarifying questions for a research topic

use super::llm::ResearchLlm;
use super::structured::parse_structured;
use delve_core::DelveResult;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_QUESTION_COUNT: usize = 3;

#[derive(Debug, Deserialize)]
struct QuestionsPayload {
    #[serde(default)]
    questions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClarifyingQuestions {
    llm: ResearchLlm,
}

impl ClarifyingQuestions {
    pub fn new(llm: ResearchLlm) -> Self {
        Self { llm }
    }

    /// Ask for at most `max_questions` questions; an unparseable response
    /// yields none
    pub async fn generate(&self, topic: &str, max_questions: usize) -> DelveResult<Vec<String>> {
        if max_questions == 0 {
            return Ok(Vec::new());
        }

        let prompt = self.llm.prompts().clarify(topic, max_questions)?;
        let raw = self.llm.complete(prompt).await?;

        let questions = match parse_structured::<QuestionsPayload>(&raw) {
            Ok(payload) => payload.questions,
            Err(e) => {
                warn!(error = %e, "Malformed clarifying questions");
                return Ok(Vec::new());
            }
        };

        let questions: Vec<String> = questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(max_questions)
            .collect();

        debug!(count = questions.len(), "Generated clarifying questions");
        Ok(questions)
    }
}
