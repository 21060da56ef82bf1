use std::{fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::AdapterError,
    types::{AssistantMessage, Message, UserMessage},
};

/// The agent under evaluation.
///
/// Implementations must resolve to exactly one assistant message and must not rely on being
/// able to mutate the transcript they are handed.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<AgentResponse, AdapterError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub message: AssistantMessage,
}

impl AgentResponse {
    pub fn new(message: AssistantMessage) -> Self {
        Self { message }
    }
}

/// Stand-in that produces user turns during a user simulation.
///
/// Only ever sees user and assistant messages.
#[async_trait]
pub trait SyntheticUser: Send + Sync {
    async fn respond(&self, messages: &[Message]) -> Result<UserMessage, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub messages: Vec<Message>,
    /// JSON Schema the output must satisfy.
    pub schema: Value,
}

/// Model-backed structured extraction used by criteria.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn invoke(&self, request: JudgeRequest) -> Result<Value, AdapterError>;
}

impl dyn Judge {
    /// Asks the judge for a `T`, validating its raw output against the schema of `T` first.
    pub async fn extract<T>(&self, messages: Vec<Message>) -> Result<T, AdapterError>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let output = self
            .invoke(JudgeRequest {
                messages,
                schema: schema.clone(),
            })
            .await?;

        validate_output(&schema, &output)?;
        Ok(serde_json::from_value(output)?)
    }
}

fn validate_output(schema: &Value, output: &Value) -> Result<(), AdapterError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|error| AdapterError::InvalidSchema(error.to_string()))?;

    let violations = match compiled.validate(output) {
        Ok(()) => return Ok(()),
        Err(errors) => errors.map(|error| error.to_string()).collect::<Vec<_>>(),
    };
    Err(AdapterError::SchemaViolation(violations))
}

type AgentFactory =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<Arc<dyn Agent>, AdapterError>> + Send>;

/// Either a ready agent or a factory that builds one. Resolved once per run.
pub enum AgentSource {
    Instance(Arc<dyn Agent>),
    Factory(AgentFactory),
}

impl AgentSource {
    pub fn instance<A>(agent: A) -> Self
    where
        A: Agent + 'static,
    {
        Self::Instance(Arc::new(agent))
    }

    pub fn factory<F, Fut>(factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<dyn Agent>, AdapterError>> + Send + 'static,
    {
        Self::Factory(Box::new(move || Box::pin(factory())))
    }

    pub(crate) async fn resolve(self) -> Result<Arc<dyn Agent>, AdapterError> {
        match self {
            AgentSource::Instance(agent) => Ok(agent),
            AgentSource::Factory(factory) => factory().await,
        }
    }
}

impl From<Arc<dyn Agent>> for AgentSource {
    fn from(agent: Arc<dyn Agent>) -> Self {
        Self::Instance(agent)
    }
}

impl fmt::Debug for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSource::Instance(_) => f.write_str("AgentSource::Instance"),
            AgentSource::Factory(_) => f.write_str("AgentSource::Factory"),
        }
    }
}
