pub mod agents;
pub mod criteria;
pub mod error;
pub mod eval;
pub mod evaluation;
pub mod providers;
pub mod segment;
pub mod types;

pub use agents::{Agent, AgentResponse, AgentSource, Judge, JudgeRequest, SyntheticUser};
pub use criteria::{
    Criterion, CriterionExt, CriterionHandle, CriterionResult, ErasedOutput, Status,
};
pub use error::{AdapterError, EvalError, ScenarioError};
pub use evaluation::{
    evaluate, EvalEntry, EvaluatedSegment, EvaluationRun, ResultsByStatus,
};
pub use segment::{
    agent_response, ai_eval, message, user_simulation, Segment, UserSimulation,
    DEFAULT_MAX_ITERATIONS,
};
pub use types::{
    AssistantMessage, GenerationContext, Message, MessageRole, SystemMessage, ToolCall,
    ToolMessage, UserMessage,
};
pub use schemars::JsonSchema;
