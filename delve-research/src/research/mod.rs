//! Deep research over the web
//!
//! - Plan search queries for a topic
//! - Search and digest the results into learnings
//! - Recurse on follow-up directions with a shrinking budget
//! - Synthesize the learnings into a report or a short answer

pub mod clarify;
pub mod digester;
pub mod engine;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod structured;
pub mod synthesizer;
pub mod types;

pub use clarify::{ClarifyingQuestions, DEFAULT_QUESTION_COUNT};
pub use digester::ResultDigester;
pub use engine::{continuation_query, ResearchEngine};
pub use llm::ResearchLlm;
pub use planner::QueryPlanner;
pub use prompts::PromptLibrary;
pub use structured::parse_structured;
pub use synthesizer::{ReportSynthesizer, ANSWER_FALLBACK, REPORT_FALLBACK};
pub use types::*;
