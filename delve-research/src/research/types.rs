//! Research type definitions

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Progress events emitted while the research tree runs.
///
/// `depth` counts remaining levels, so the root level carries the initial
/// depth and leaves carry 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResearchProgress {
    Planned {
        depth: usize,
        queries: Vec<String>,
    },
    QueryStarted {
        depth: usize,
        query: String,
    },
    QueryCompleted {
        depth: usize,
        query: String,
        learnings: usize,
        urls: usize,
    },
    QueryFailed {
        depth: usize,
        query: String,
        kind: String,
    },
}

pub type ProgressSender = UnboundedSender<ResearchProgress>;

/// Output of digesting one query's search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
    /// The model response could not be parsed; both lists are empty
    pub degraded: bool,
}

impl Digest {
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

/// Which final document to produce from the learnings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Report,
    Answer,
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(OutputMode::Report),
            "answer" => Ok(OutputMode::Answer),
            other => Err(format!("unknown output mode '{}' (expected report or answer)", other)),
        }
    }
}

impl OutputMode {
    /// Default file name for the document
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputMode::Report => "report.md",
            OutputMode::Answer => "answer.md",
        }
    }
}
