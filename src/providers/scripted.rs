use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    agents::{Agent, AgentResponse, Judge, JudgeRequest, SyntheticUser},
    error::AdapterError,
    types::{AssistantMessage, Message, UserMessage},
};

/// Replays canned replies in order, one per call, and fails once they run out.
#[derive(Debug)]
struct Script<T> {
    remaining: Mutex<VecDeque<T>>,
}

impl<T> Script<T> {
    fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            remaining: Mutex::new(items.into_iter().collect()),
        }
    }

    fn next(&self, what: &'static str) -> Result<T, AdapterError> {
        self.remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(AdapterError::ScriptExhausted(what))
    }

    fn len(&self) -> usize {
        self.remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug)]
pub struct ScriptedAgent {
    replies: Script<AssistantMessage>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedAgent {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_messages(replies.into_iter().map(AssistantMessage::new))
    }

    pub fn from_messages<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = AssistantMessage>,
    {
        Self {
            replies: Script::new(replies),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }

    /// Transcripts the agent was invoked with, in call order.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(&self, messages: &[Message]) -> Result<AgentResponse, AdapterError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.replies.next("agent").map(AgentResponse::new)
    }
}

#[derive(Debug)]
pub struct ScriptedUser {
    turns: Script<String>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedUser {
    pub fn new<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            turns: Script::new(turns.into_iter().map(Into::into)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SyntheticUser for ScriptedUser {
    async fn respond(&self, messages: &[Message]) -> Result<UserMessage, AdapterError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.turns.next("user").map(UserMessage::new)
    }
}

/// Judge that answers with canned JSON outputs and records every request.
#[derive(Debug)]
pub struct ScriptedJudge {
    outputs: Script<Value>,
    requests: Mutex<Vec<JudgeRequest>>,
}

impl ScriptedJudge {
    pub fn new<I>(outputs: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self {
            outputs: Script::new(outputs),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<JudgeRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn invoke(&self, request: JudgeRequest) -> Result<Value, AdapterError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.outputs.next("judge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn agent_replays_in_order_then_errors() {
        let agent = ScriptedAgent::new(["first", "second"]);

        let first = agent.invoke(&[Message::user("a")]).await.unwrap();
        let second = agent.invoke(&[Message::user("b")]).await.unwrap();
        assert_eq!(first.message.content, "first");
        assert_eq!(second.message.content, "second");
        assert_eq!(agent.remaining(), 0);

        let error = agent.invoke(&[Message::user("c")]).await.unwrap_err();
        assert!(matches!(error, AdapterError::ScriptExhausted("agent")));
        assert_eq!(agent.seen().len(), 3);
    }

    #[tokio::test]
    async fn user_records_what_it_saw() {
        let user = ScriptedUser::new(["Hi!"]);
        let reply = user.respond(&[Message::assistant("Welcome")]).await.unwrap();
        assert_eq!(reply.content, "Hi!");
        assert_eq!(user.seen(), vec![vec![Message::assistant("Welcome")]]);
    }
}
