use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    agents::Judge,
    criteria::{scorer::threshold_status, Criterion, CriterionResult, Status},
    error::AdapterError,
    types::{render_conversation, Message},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimVerdict {
    /// A single factual claim made in the assistant's response.
    pub claim: String,
    /// True if the claim is supported by the context, false otherwise.
    pub supported: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FaithfulnessVerdict {
    /// Every claim of the response, each with its verdict.
    results: Vec<ClaimVerdict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaithfulnessOutput {
    pub results: Vec<ClaimVerdict>,
    /// Share of supported claims. `None` when the response made no claims.
    pub score: Option<f64>,
}

/// Checks that the last assistant reply only states what the preceding conversation supports.
pub struct FaithfulnessCriterion {
    judge: Arc<dyn Judge>,
    score_threshold: f64,
}

impl FaithfulnessCriterion {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self {
            judge,
            score_threshold: 1.0,
        }
    }

    /// Share of claims, between 0 and 1, that must be supported. Defaults to 1.
    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = threshold;
        self
    }
}

fn judge_prompt(context: &[Message], response: &str) -> String {
    format!(
        "You are a judge.\n\n\
         Break the response below into its individual factual claims. For each claim decide \
         whether it is supported by the context. A claim is supported only if the context \
         states it or it follows directly from the context.\n\n\
         Context:\n\
         <context>\n{}\n</context>\n\n\
         Response:\n\
         <response>\n{}\n</response>\n",
        render_conversation(context),
        response
    )
}

#[async_trait]
impl Criterion for FaithfulnessCriterion {
    type Output = FaithfulnessOutput;

    fn name(&self) -> &str {
        "faithfulness"
    }

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<FaithfulnessOutput>, AdapterError> {
        let Some((position, reply)) = messages
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, message)| message.as_assistant().map(|reply| (index, reply)))
        else {
            let output = FaithfulnessOutput {
                results: Vec::new(),
                score: None,
            };
            let result = CriterionResult::failure(output);
            return Ok(result.with_reason("no assistant response to check"));
        };

        // The prompt the agent reports having used wins over the transcript before the reply.
        let context = reply
            .context
            .as_ref()
            .and_then(|context| context.prompt_used.as_deref())
            .unwrap_or(&messages[..position]);
        let prompt = judge_prompt(context, &reply.content);
        let verdict: FaithfulnessVerdict =
            self.judge.extract(vec![Message::system(prompt)]).await?;

        let supported = verdict.results.iter().filter(|claim| claim.supported).count();
        let score = (!verdict.results.is_empty())
            .then(|| supported as f64 / verdict.results.len() as f64);
        let status = threshold_status(score, self.score_threshold);

        let unsupported: Vec<&str> = verdict
            .results
            .iter()
            .filter(|claim| !claim.supported)
            .map(|claim| claim.claim.as_str())
            .collect();
        let reason = match (status, score) {
            (Status::Failure, None) => Some("the response made no checkable claims".to_string()),
            (Status::Failure, Some(_)) => {
                Some(format!("unsupported claims: {}", unsupported.join("; ")))
            }
            (Status::Success, _) => None,
        };

        Ok(CriterionResult {
            output: FaithfulnessOutput {
                results: verdict.results,
                score,
            },
            reason,
            error: None,
            status: Some(status),
        })
    }
}
