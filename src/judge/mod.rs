//! Coherence judgments from the AI summarization collaborator.
//!
//! The collaborator is reached through [`ClusterJudge`], which returns the
//! raw reply text. Replies are never trusted: [`parse_judgment`] turns them
//! into a [`JudgeReply`] and every caller handles both outcomes.

pub mod parse;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Frame;

pub use parse::parse_judgment;
pub use prompt::build_prompt;

/// Relevance assigned when no usable judgment could be obtained.
pub const FAILURE_RELEVANCE: f64 = 0.3;

#[async_trait]
pub trait ClusterJudge: Send + Sync {
    /// Asks whether the sampled frames show one coherent task.
    ///
    /// Returns the collaborator's reply verbatim; transport problems are
    /// errors, malformed content is not.
    async fn judge_cluster(&self, prompt: &str, samples: &[Frame]) -> anyhow::Result<String>;
}

/// Structured answer to a coherence request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterJudgment {
    pub is_coherent_task: bool,
    pub task_name: String,
    pub description: String,
    pub success: Option<bool>,
    pub relevance: f64,
}

impl ClusterJudgment {
    /// Judgment applied when the collaborator fails or replies with garbage.
    /// It always excludes the cluster.
    pub fn default_failure() -> Self {
        Self {
            is_coherent_task: false,
            task_name: String::new(),
            description: String::new(),
            success: None,
            relevance: FAILURE_RELEVANCE,
        }
    }
}

/// Outcome of reading a collaborator reply.
#[derive(Debug, Clone, PartialEq)]
pub enum JudgeReply {
    Parsed(ClusterJudgment),
    ParseError(String),
}

impl JudgeReply {
    /// The parsed judgment, or the default failure judgment.
    pub fn into_judgment(self) -> ClusterJudgment {
        match self {
            JudgeReply::Parsed(judgment) => judgment,
            JudgeReply::ParseError(_) => ClusterJudgment::default_failure(),
        }
    }
}
