use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by an external collaborator: an agent, judge, synthetic user or criterion.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("judge output violates schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("invalid judge schema: {0}")]
    InvalidSchema(String),

    #[error("no more scripted {0} responses")]
    ScriptExhausted(&'static str),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("criterion evaluation appears before any messages: {criterion}")]
    CriterionBeforeMessages { criterion: String },

    #[error("cannot find results for criterion {criterion}")]
    MissingResult { criterion: String },

    #[error("agent invocation failed: {0}")]
    Agent(#[source] AdapterError),

    #[error("synthetic user failed to respond: {0}")]
    User(#[source] AdapterError),

    #[error("criterion {criterion} failed: {source}")]
    Criterion {
        criterion: String,
        #[source]
        source: AdapterError,
    },

    #[error("criterion {criterion} did not complete: {source}")]
    CriterionTask {
        criterion: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
