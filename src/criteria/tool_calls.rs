use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    criteria::{Criterion, CriterionResult, Status},
    error::AdapterError,
    types::{Message, ToolCall},
};

/// Collects every tool call the agent made across the transcript, in order.
///
/// Calls recorded in an assistant message's generation context win, since they carry results.
/// Otherwise the message's own `tool_calls` are used and their results are filled in from tool
/// messages that answer them by id.
pub fn extract_tool_calls(messages: &[Message]) -> Vec<ToolCall> {
    let results: HashMap<&str, &Map<String, Value>> = messages
        .iter()
        .filter_map(|message| match message {
            Message::Tool(tool) => tool
                .tool_call_id
                .as_deref()
                .map(|id| (id, &tool.content)),
            _ => None,
        })
        .collect();

    let mut calls = Vec::new();
    for message in messages {
        let Some(assistant) = message.as_assistant() else {
            continue;
        };

        match &assistant.context {
            Some(context) if !context.tool_calls.is_empty() => {
                calls.extend(context.tool_calls.iter().cloned());
            }
            _ => {
                calls.extend(assistant.tool_calls.iter().map(|call| {
                    let mut call = call.clone();
                    if call.result.is_none() {
                        call.result = call
                            .id
                            .as_deref()
                            .and_then(|id| results.get(id))
                            .map(|content| (*content).clone());
                    }
                    call
                }));
            }
        }
    }
    calls
}

/// Runs a caller-supplied assertion over the extracted tool calls.
///
/// `Ok(value)` passes with `Some(value)`; `Err(message)` fails and records the message as the
/// result's error.
pub struct ToolCallsCriterion<F> {
    name: String,
    assertion: F,
}

impl<F, T> ToolCallsCriterion<F>
where
    F: Fn(&[ToolCall]) -> Result<T, String> + Send + Sync,
{
    pub fn new(assertion: F) -> Self {
        Self {
            name: "tool calls".to_string(),
            assertion,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, T> Criterion for ToolCallsCriterion<F>
where
    F: Fn(&[ToolCall]) -> Result<T, String> + Send + Sync,
    T: Send + Sync + 'static,
{
    type Output = Option<T>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<Option<T>>, AdapterError> {
        let calls = extract_tool_calls(messages);
        Ok(match (self.assertion)(&calls) {
            Ok(value) => CriterionResult::success(Some(value)),
            Err(error) => CriterionResult::failure(None).with_error(error),
        })
    }
}

type ToolCallAssertion = Arc<dyn Fn(&ToolCall) -> bool + Send + Sync>;

/// A tool that must have been called, optionally with an extra check on the call itself.
#[derive(Clone)]
pub struct ExpectedToolCall {
    pub name: String,
    assertion: Option<ToolCallAssertion>,
}

impl ExpectedToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assertion: None,
        }
    }

    pub fn with_assertion<F>(mut self, assertion: F) -> Self
    where
        F: Fn(&ToolCall) -> bool + Send + Sync + 'static,
    {
        self.assertion = Some(Arc::new(assertion));
        self
    }

    fn matches(&self, call: &ToolCall) -> bool {
        call.name == self.name
            && self
                .assertion
                .as_ref()
                .map_or(true, |assertion| assertion(call))
    }
}

impl fmt::Debug for ExpectedToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedToolCall")
            .field("name", &self.name)
            .field("has_assertion", &self.assertion.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCalledOutput {
    pub tool_call_order_satisfied: bool,
    /// Expected calls with no matching call anywhere in the transcript.
    pub missing: Vec<String>,
}

/// Passes when every expected tool call was made, in order when `assert_order` is set.
#[derive(Debug, Clone)]
pub struct ToolsCalledCriterion {
    name: String,
    tool_calls: Vec<ExpectedToolCall>,
    assert_order: bool,
}

impl ToolsCalledCriterion {
    pub fn new<I>(tool_calls: I) -> Self
    where
        I: IntoIterator<Item = ExpectedToolCall>,
    {
        let tool_calls: Vec<_> = tool_calls.into_iter().collect();
        let names = tool_calls
            .iter()
            .map(|call| call.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: format!("tools called: {names}"),
            tool_calls,
            assert_order: false,
        }
    }

    pub fn with_order(mut self, assert_order: bool) -> Self {
        self.assert_order = assert_order;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn check(&self, calls: &[ToolCall]) -> ToolsCalledOutput {
        let mut missing = Vec::new();
        let mut out_of_order = false;
        let mut cursor = 0;

        for expected in &self.tool_calls {
            let anywhere = calls.iter().any(|call| expected.matches(call));
            if !anywhere {
                missing.push(expected.name.clone());
                continue;
            }
            if !self.assert_order {
                continue;
            }
            match calls[cursor..].iter().position(|call| expected.matches(call)) {
                Some(offset) => cursor += offset + 1,
                None => out_of_order = true,
            }
        }

        ToolsCalledOutput {
            tool_call_order_satisfied: !out_of_order,
            missing,
        }
    }
}

#[async_trait]
impl Criterion for ToolsCalledCriterion {
    type Output = ToolsCalledOutput;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<ToolsCalledOutput>, AdapterError> {
        let output = self.check(&extract_tool_calls(messages));
        let passed = output.missing.is_empty() && output.tool_call_order_satisfied;

        let reason = if !output.missing.is_empty() {
            Some(format!("tools not called: {}", output.missing.join(", ")))
        } else if !output.tool_call_order_satisfied {
            Some("tools were not called in the expected order".to_string())
        } else {
            None
        };

        let mut result = CriterionResult::new(output, Some(Status::from_bool(passed)));
        result.reason = reason;
        Ok(result)
    }
}
