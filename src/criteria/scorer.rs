use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    criteria::{Criterion, CriterionResult, Status},
    error::AdapterError,
    types::Message,
};

/// Numeric verdict produced by an external scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub name: String,
    /// `None` when the scorer could not decide.
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Score {
    pub fn new(name: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            name: name.into(),
            score,
            metadata: None,
        }
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, messages: &[Message]) -> Result<Score, AdapterError>;
}

#[async_trait]
impl<F> Scorer for F
where
    F: Fn(&[Message]) -> Score + Send + Sync,
{
    async fn score(&self, messages: &[Message]) -> Result<Score, AdapterError> {
        Ok(self(messages))
    }
}

/// Passes when the score reaches the threshold. A missing score never passes.
pub struct ScorerCriterion<S> {
    name: String,
    scorer: S,
    success_threshold: f64,
}

impl<S: Scorer> ScorerCriterion<S> {
    pub fn new(name: impl Into<String>, scorer: S) -> Self {
        Self {
            name: name.into(),
            scorer,
            success_threshold: 1.0,
        }
    }

    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }
}

pub(crate) fn threshold_status(score: Option<f64>, threshold: f64) -> Status {
    match score {
        Some(score) => Status::from_bool(score >= threshold),
        None => Status::Failure,
    }
}

#[async_trait]
impl<S: Scorer> Criterion for ScorerCriterion<S> {
    type Output = Score;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, messages: &[Message]) -> Result<CriterionResult<Score>, AdapterError> {
        let score = self.scorer.score(messages).await?;
        let status = threshold_status(score.score, self.success_threshold);
        Ok(CriterionResult::new(score, Some(status)))
    }
}
