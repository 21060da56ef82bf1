use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A single turn of a transcript. Never mutated once it has been appended to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
}

impl UserMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<GenerationContext>,
}

impl AssistantMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            context: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_context(mut self, context: GenerationContext) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub name: String,
    pub content: Map<String, Value>,
}

/// What the agent used to produce a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Messages sent as the prompt. When absent, the transcript preceding the response is assumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_used: Option<Vec<Message>>,
    /// Tool calls made while generating, with their results when known.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            args: Map::new(),
            result: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_result(mut self, result: Map<String, Value>) -> Self {
        self.result = Some(result);
        self
    }
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System(SystemMessage {
            content: content.into(),
        })
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User(UserMessage::new(content))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant(AssistantMessage::new(content))
    }

    pub fn tool(id: Option<String>, name: impl Into<String>, content: Map<String, Value>) -> Self {
        Message::Tool(ToolMessage {
            tool_call_id: id,
            name: name.into(),
            content,
        })
    }

    pub fn role(&self) -> MessageRole {
        match self {
            Message::System(_) => MessageRole::System,
            Message::User(_) => MessageRole::User,
            Message::Assistant(_) => MessageRole::Assistant,
            Message::Tool(_) => MessageRole::Tool,
        }
    }

    /// Textual content; tool payloads are rendered as compact JSON.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Message::System(message) => Cow::Borrowed(&message.content),
            Message::User(message) => Cow::Borrowed(&message.content),
            Message::Assistant(message) => Cow::Borrowed(&message.content),
            Message::Tool(message) => {
                Cow::Owned(Value::Object(message.content.clone()).to_string())
            }
        }
    }

    /// True for user and assistant turns, the only ones a synthetic user gets to see.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Message::User(_) | Message::Assistant(_))
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(message) => Some(message),
            _ => None,
        }
    }
}

impl From<UserMessage> for Message {
    fn from(message: UserMessage) -> Self {
        Message::User(message)
    }
}

impl From<AssistantMessage> for Message {
    fn from(message: AssistantMessage) -> Self {
        Message::Assistant(message)
    }
}

/// Renders messages as `<role>content</role>` blocks for judge prompts.
pub fn render_conversation(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| {
            let role = message.role().as_str();
            format!("<{role}>{}</{role}>", message.text())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
