use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::{
    agents::Judge,
    criteria::{Criterion, CriterionResult, Status},
    error::AdapterError,
    types::{render_conversation, Message},
};

#[derive(Debug, Deserialize, JsonSchema)]
struct AssertionVerdict {
    /// True if the assertion is correct, false otherwise.
    verdict: bool,
    /// If false, explain why the assertion fails. Null if the assertion passes.
    reason: Option<String>,
}

/// Asks a judge whether a natural-language assertion holds for the conversation.
///
/// The criterion is named after its prompt.
pub struct AiAssertion {
    prompt: String,
    judge: Arc<dyn Judge>,
}

impl AiAssertion {
    pub fn new(prompt: impl Into<String>, judge: Arc<dyn Judge>) -> Self {
        Self {
            prompt: prompt.into(),
            judge,
        }
    }

    fn judge_prompt(&self, messages: &[Message]) -> String {
        format!(
            "You are a judge.\n\n\
             You evaluate the truth value of an assertion based on a given prompt.\n\
             The prompt is a statement about a conversation between the AI assistant and the \
             user.\n\n\
             You need to determine if the response is a correct answer to the prompt.\n\n\
             Assertion prompt:\n\
             <assertion-prompt>\n{}\n</assertion-prompt>\n\n\
             Conversation between AI and user:\n\
             <conversation>\n{}\n</conversation>\n",
            self.prompt,
            render_conversation(messages)
        )
    }
}

#[async_trait]
impl Criterion for AiAssertion {
    type Output = bool;

    fn name(&self) -> &str {
        &self.prompt
    }

    async fn evaluate(&self, messages: &[Message]) -> Result<CriterionResult<bool>, AdapterError> {
        let prompt = self.judge_prompt(messages);
        let verdict: AssertionVerdict = self.judge.extract(vec![Message::system(prompt)]).await?;

        Ok(CriterionResult {
            output: verdict.verdict,
            reason: verdict
                .reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty()),
            error: None,
            status: Some(Status::from_bool(verdict.verdict)),
        })
    }
}
