use std::{fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    agents::SyntheticUser,
    criteria::{
        CriterionHandle, CriterionResult, ExpectedToolCall, MockCriterion, ReplyMatches, Status,
        ToolsCalledCriterion,
    },
    error::ScenarioError,
    providers::scripted::{ScriptedAgent, ScriptedUser},
    segment::{Segment, UserSimulation, DEFAULT_MAX_ITERATIONS},
    types::{AssistantMessage, Message},
};

/// A scenario as written in a YAML or JSON file.
///
/// The agent and the synthetic user are scripted: replies are handed out in file order, one
/// per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDocument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent: Vec<ScriptedReply>,
    #[serde(default)]
    pub user: Vec<String>,
    pub segments: Vec<SegmentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptedReply {
    Text(String),
    Message(AssistantMessage),
}

impl From<ScriptedReply> for AssistantMessage {
    fn from(reply: ScriptedReply) -> Self {
        match reply {
            ScriptedReply::Text(content) => AssistantMessage::new(content),
            ScriptedReply::Message(message) => message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentSpec {
    Message {
        message: Message,
    },
    AgentResponse,
    AiEval {
        criterion: CriterionSpec,
    },
    UserSimulation {
        until: CriterionSpec,
        #[serde(default)]
        max: Option<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub check: CheckSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum CheckSpec {
    ToolsCalled {
        tools: Vec<String>,
        #[serde(default)]
        ordered: bool,
    },
    ReplyMatches {
        pattern: String,
    },
    Mock {
        #[serde(default)]
        status: Option<Status>,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl CriterionSpec {
    pub fn build(&self) -> Result<CriterionHandle, ScenarioError> {
        let handle = match &self.check {
            CheckSpec::ToolsCalled { tools, ordered } => {
                let mut criterion =
                    ToolsCalledCriterion::new(tools.iter().map(ExpectedToolCall::new))
                        .with_order(*ordered);
                if let Some(name) = &self.name {
                    criterion = criterion.with_name(name.clone());
                }
                CriterionHandle::new(&Arc::new(criterion))
            }
            CheckSpec::ReplyMatches { pattern } => {
                let mut criterion = ReplyMatches::new(pattern)?;
                if let Some(name) = &self.name {
                    criterion = criterion.with_name(name.clone());
                }
                CriterionHandle::new(&Arc::new(criterion))
            }
            CheckSpec::Mock { status, reason } => {
                let mut result = CriterionResult::new((), *status);
                result.reason = reason.clone();
                let mut criterion = MockCriterion::new(result);
                if let Some(name) = &self.name {
                    criterion = criterion.with_name(name.clone());
                }
                CriterionHandle::new(&Arc::new(criterion))
            }
        };
        Ok(handle)
    }
}

/// A scenario ready to hand to [`evaluate`](crate::evaluate).
#[derive(Debug)]
pub struct Scenario {
    pub name: String,
    pub agent: Arc<ScriptedAgent>,
    pub segments: Vec<Segment>,
}

impl ScenarioDocument {
    pub fn from_yaml_str(source: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn build(&self) -> Result<Scenario, ScenarioError> {
        let agent = Arc::new(ScriptedAgent::from_messages(
            self.agent.iter().cloned().map(AssistantMessage::from),
        ));
        let user: Arc<dyn SyntheticUser> = Arc::new(ScriptedUser::new(self.user.iter().cloned()));

        let segments = self
            .segments
            .iter()
            .map(|spec| {
                Ok(match spec {
                    SegmentSpec::Message { message } => Segment::Message(message.clone()),
                    SegmentSpec::AgentResponse => Segment::AgentResponse,
                    SegmentSpec::AiEval { criterion } => Segment::AiEval(criterion.build()?),
                    SegmentSpec::UserSimulation { until, max } => {
                        Segment::UserSimulation(UserSimulation::from_handle(
                            Arc::clone(&user),
                            until.build()?,
                            max.unwrap_or(DEFAULT_MAX_ITERATIONS),
                        ))
                    }
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        Ok(Scenario {
            name: self.name.clone(),
            agent,
            segments,
        })
    }
}

/// Loads one scenario file, or every `.yaml`, `.yml` and `.json` file of a directory sorted by
/// scenario name.
pub fn load_scenarios(path: impl AsRef<Path>) -> Result<Vec<ScenarioDocument>, ScenarioError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(vec![load_file(path)?]);
    }

    let entries = fs::read_dir(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut scenarios = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = entry.path();
        let ext = file.extension().and_then(|s| s.to_str()).unwrap_or("");
        if matches!(ext, "yaml" | "yml" | "json") {
            scenarios.push(load_file(&file)?);
        }
    }
    scenarios.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scenarios)
}

fn load_file(path: &Path) -> Result<ScenarioDocument, ScenarioError> {
    let source = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => ScenarioDocument::from_json_str(&source),
        _ => ScenarioDocument::from_yaml_str(&source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETING: &str = r#"
name: greeting
agent:
  - "Hello! How can I help?"
  - content: ""
    tool_calls:
      - id: call_1
        name: get_weather
        args: { city: Paris }
user: ["Weather in Paris?"]
segments:
  - kind: message
    message: { role: user, content: Hi }
  - kind: agent_response
  - kind: ai_eval
    criterion: { check: reply_matches, pattern: "(?i)hello", name: greets }
  - kind: user_simulation
    max: 1
    until: { check: tools_called, tools: [get_weather] }
"#;

    #[test]
    fn parses_yaml_documents() {
        let document = ScenarioDocument::from_yaml_str(GREETING).unwrap();
        assert_eq!(document.name, "greeting");
        assert_eq!(document.segments.len(), 4);
        assert!(matches!(document.agent[0], ScriptedReply::Text(_)));
        match &document.agent[1] {
            ScriptedReply::Message(message) => {
                assert_eq!(message.tool_calls[0].name, "get_weather")
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        match &document.segments[2] {
            SegmentSpec::AiEval { criterion } => {
                assert_eq!(criterion.name.as_deref(), Some("greets"));
                assert!(matches!(criterion.check, CheckSpec::ReplyMatches { .. }));
            }
            other => panic!("unexpected segment: {other:?}"),
        }
    }

    #[test]
    fn builds_segments() {
        let scenario = ScenarioDocument::from_yaml_str(GREETING)
            .unwrap()
            .build()
            .unwrap();

        let kinds: Vec<_> = scenario.segments.iter().map(Segment::kind).collect();
        assert_eq!(kinds, ["message", "agent_response", "ai_eval", "user_simulation"]);
        match &scenario.segments[2] {
            Segment::AiEval(criterion) => assert_eq!(criterion.name(), "greets"),
            other => panic!("unexpected segment: {other:?}"),
        }
        match &scenario.segments[3] {
            Segment::UserSimulation(simulation) => assert_eq!(simulation.max(), 1),
            other => panic!("unexpected segment: {other:?}"),
        }
        assert_eq!(scenario.agent.remaining(), 2);
    }

    #[test]
    fn invalid_patterns_fail_the_build() {
        let document = ScenarioDocument::from_json_str(
            r#"{
                "name": "broken",
                "segments": [
                    { "kind": "ai_eval", "criterion": { "check": "reply_matches", "pattern": "(" } }
                ]
            }"#,
        )
        .unwrap();

        assert!(matches!(document.build(), Err(ScenarioError::Pattern(_))));
    }
}
