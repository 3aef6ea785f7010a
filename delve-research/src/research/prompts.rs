//! Prompt templates for every research step

use chrono::{DateTime, SecondsFormat, Utc};
use delve_core::{DelveError, DelveResult, ErrorContext};
use serde::Serialize;
use tera::{Context, Tera};

const SYSTEM: &str = "system";
const PLAN: &str = "plan";
const DIGEST: &str = "digest";
const REPORT: &str = "report";
const ANSWER: &str = "answer";
const CLARIFY: &str = "clarify";

const SYSTEM_TEMPLATE: &str = r#"You are a meticulous research analyst. The current time is {{ now }}.
- The topic may concern events after your training data ends; trust the material you are given over your own recollection.
- The reader is an expert. Be precise and detailed rather than simplified.
- Organize your output clearly.
- Prefer well-supported arguments over appeals to authority.
- Consider unconventional angles and emerging work, not only the mainstream view.
- Speculation is allowed when flagged as such."#;

const PLAN_TEMPLATE: &str = r#"Produce web search queries for researching the topic below. Return at most {{ max_queries }} queries; fewer is fine when the topic is narrow. Each query must explore a different angle.

<topic>
{{ topic }}
</topic>
{%- if learnings %}

Findings from earlier research. Use them to make the queries more specific and to avoid repeating ground already covered:
<learnings>
{%- for learning in learnings %}
{{ learning }}
{%- endfor %}
</learnings>
{%- endif %}

Respond with a single JSON object of the form {"queries": [{"query": "...", "researchGoal": "..."}]}. The researchGoal states what the query should establish and which directions to pursue once results arrive."#;

const DIGEST_TEMPLATE: &str = r#"Below are the contents returned by a web search for <query>{{ query }}</query>. Extract at most {{ max_learnings }} distinct learnings from them. Each learning should be dense with facts: name the entities, figures, metrics and dates involved. Skip anything repeated.

<contents>
{%- for content in contents %}
<content>
{{ content }}
</content>
{%- endfor %}
</contents>

Also propose at most {{ max_follow_ups }} follow-up questions that would deepen the research.

Respond with a single JSON object of the form {"learnings": ["..."], "followUpQuestions": ["..."]}."#;

const REPORT_TEMPLATE: &str = r#"Write a comprehensive report on the topic below using the research learnings provided. Be as detailed as the material allows and aim for several pages. Include every learning that is relevant.

<topic>
{{ topic }}
</topic>

<learnings>
{{ learnings }}
</learnings>

Respond with a single JSON object of the form {"reportMarkdown": "..."} where reportMarkdown is the full report in Markdown."#;

const ANSWER_TEMPLATE: &str = r#"Answer the question below as briefly and exactly as possible, using the research learnings provided. If the question specifies an answer format, follow it exactly. No explanation, just the answer.

<question>
{{ topic }}
</question>

<learnings>
{{ learnings }}
</learnings>

Respond with a single JSON object of the form {"exactAnswer": "..."}."#;

const CLARIFY_TEMPLATE: &str = r#"A user wants research on the topic below. Ask up to {{ max_questions }} follow-up questions that would clarify the direction of the research. Return fewer if the topic is already clear.

<topic>
{{ topic }}
</topic>

Respond with a single JSON object of the form {"questions": ["..."]}."#;

/// Rendered prompts for planning, digesting, reporting and clarifying
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> DelveResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (SYSTEM, SYSTEM_TEMPLATE),
            (PLAN, PLAN_TEMPLATE),
            (DIGEST, DIGEST_TEMPLATE),
            (REPORT, REPORT_TEMPLATE),
            (ANSWER, ANSWER_TEMPLATE),
            (CLARIFY, CLARIFY_TEMPLATE),
        ])
        .map_err(|e| template_error("load_templates", e))?;

        Ok(Self { tera })
    }

    /// Shared system prompt, stamped with `now`
    pub fn system_prompt(&self, now: DateTime<Utc>) -> DelveResult<String> {
        let mut context = Context::new();
        context.insert("now", &now.to_rfc3339_opts(SecondsFormat::Secs, true));
        self.render(SYSTEM, &context)
    }

    pub fn plan(&self, topic: &str, learnings: &[String], max_queries: usize) -> DelveResult<String> {
        let mut context = Context::new();
        context.insert("topic", topic);
        context.insert("learnings", learnings);
        context.insert("max_queries", &max_queries);
        self.render(PLAN, &context)
    }

    pub fn digest<S: Serialize>(
        &self,
        query: &str,
        contents: &[S],
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> DelveResult<String> {
        let mut context = Context::new();
        context.insert("query", query);
        context.insert("contents", contents);
        context.insert("max_learnings", &max_learnings);
        context.insert("max_follow_ups", &max_follow_ups);
        self.render(DIGEST, &context)
    }

    /// `learnings` is the already trimmed learnings block
    pub fn report(&self, topic: &str, learnings: &str) -> DelveResult<String> {
        let mut context = Context::new();
        context.insert("topic", topic);
        context.insert("learnings", learnings);
        self.render(REPORT, &context)
    }

    pub fn answer(&self, topic: &str, learnings: &str) -> DelveResult<String> {
        let mut context = Context::new();
        context.insert("topic", topic);
        context.insert("learnings", learnings);
        self.render(ANSWER, &context)
    }

    pub fn clarify(&self, topic: &str, max_questions: usize) -> DelveResult<String> {
        let mut context = Context::new();
        context.insert("topic", topic);
        context.insert("max_questions", &max_questions);
        self.render(CLARIFY, &context)
    }

    fn render(&self, name: &str, context: &Context) -> DelveResult<String> {
        self.tera
            .render(name, context)
            .map_err(|e| template_error(name, e))
    }
}

/// Wrap each learning in `<learning>` tags, one block per learning
pub fn learnings_block(learnings: &[String]) -> String {
    learnings
        .iter()
        .map(|learning| format!("<learning>\n{}\n</learning>", learning))
        .collect::<Vec<_>>()
        .join("\n")
}

fn template_error(operation: &str, error: tera::Error) -> DelveError {
    DelveError::Internal {
        message: format!("Prompt template failed: {}", error),
        source: Some(Box::new(error)),
        context: ErrorContext::new("prompts").with_operation(operation),
    }
}
