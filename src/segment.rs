use std::{fmt, sync::Arc};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    agents::{Agent, SyntheticUser},
    criteria::{Criterion, CriterionHandle, CriterionResult, ErasedOutput},
    error::{AdapterError, EvalError},
    evaluation::EvaluatedSegment,
    types::Message,
};

/// Iterations a user simulation runs when no maximum is given.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// One scripted step of an evaluation scenario.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Adds the message to the transcript as-is.
    Message(Message),
    /// Asks the agent for the next assistant message.
    AgentResponse,
    /// Judges the transcript so far. The verdict is collected once the whole scenario ran.
    AiEval(CriterionHandle),
    /// Lets a synthetic user talk to the agent, see [`UserSimulation`].
    UserSimulation(UserSimulation),
}

/// Segment that adds a fixed message.
pub fn message(message: impl Into<Message>) -> Segment {
    Segment::Message(message.into())
}

/// Segment that asks the agent to reply.
pub fn agent_response() -> Segment {
    Segment::AgentResponse
}

/// Segment that judges the transcript so far with `criterion`.
pub fn ai_eval<C>(criterion: &Arc<C>) -> Segment
where
    C: Criterion + 'static,
{
    Segment::AiEval(CriterionHandle::new(criterion))
}

/// Segment that runs a synthetic user conversation.
pub fn user_simulation(simulation: UserSimulation) -> Segment {
    Segment::UserSimulation(simulation)
}

impl Segment {
    pub fn kind(&self) -> &'static str {
        match self {
            Segment::Message(_) => "message",
            Segment::AgentResponse => "agent_response",
            Segment::AiEval(_) => "ai_eval",
            Segment::UserSimulation(_) => "user_simulation",
        }
    }

    /// Produces this segment's events given the messages that precede it.
    pub(crate) async fn evaluate(
        &self,
        agent: &dyn Agent,
        transcript: &[Message],
    ) -> Result<Vec<EvaluationEvent>, EvalError> {
        match self {
            Segment::Message(message) => Ok(vec![EvaluationEvent::Message(message.clone())]),
            Segment::AgentResponse => {
                let response = agent.invoke(transcript).await.map_err(EvalError::Agent)?;
                Ok(vec![EvaluationEvent::Message(Message::Assistant(
                    response.message,
                ))])
            }
            Segment::AiEval(criterion) => {
                if transcript.is_empty() {
                    return Err(EvalError::CriterionBeforeMessages {
                        criterion: criterion.name().to_string(),
                    });
                }
                Ok(vec![EvaluationEvent::Eval {
                    criterion: criterion.clone(),
                    result: PendingResult::spawn(criterion.clone(), transcript.to_vec()),
                }])
            }
            Segment::UserSimulation(simulation) => simulation.run(agent, transcript).await,
        }
    }
}

/// A synthetic user talks to the agent until `until` succeeds or `max` rounds have passed.
///
/// Each round appends one user message and one agent reply before `until` is checked, and the
/// segment emits a single eval event for `until` when it stops. With `max` set to zero nothing
/// runs and nothing is emitted.
#[derive(Clone)]
pub struct UserSimulation {
    user: Arc<dyn SyntheticUser>,
    until: CriterionHandle,
    max: usize,
}

impl UserSimulation {
    pub fn new<C>(user: Arc<dyn SyntheticUser>, until: &Arc<C>) -> Self
    where
        C: Criterion + 'static,
    {
        Self {
            user,
            until: CriterionHandle::new(until),
            max: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Builds a simulation around an already erased criterion, e.g. one read from a scenario file.
    pub fn from_handle(user: Arc<dyn SyntheticUser>, until: CriterionHandle, max: usize) -> Self {
        Self { user, until, max }
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    pub fn max(&self) -> usize {
        self.max
    }

    async fn run(
        &self,
        agent: &dyn Agent,
        transcript: &[Message],
    ) -> Result<Vec<EvaluationEvent>, EvalError> {
        let mut working = transcript.to_vec();
        let mut events = Vec::new();

        for iteration in 0..self.max {
            let visible: Vec<Message> = working
                .iter()
                .filter(|message| message.is_conversational())
                .cloned()
                .collect();
            let user_message = Message::from(
                self.user.respond(&visible).await.map_err(EvalError::User)?,
            );
            working.push(user_message.clone());
            events.push(EvaluationEvent::Message(user_message));

            let response = agent.invoke(&working).await.map_err(EvalError::Agent)?;
            let reply = Message::Assistant(response.message);
            working.push(reply.clone());
            events.push(EvaluationEvent::Message(reply));

            let result = self
                .until
                .evaluate(&working)
                .await
                .map_err(|source| EvalError::Criterion {
                    criterion: self.until.name().to_string(),
                    source,
                })?;

            let succeeded = result.is_success();
            if succeeded || iteration + 1 == self.max {
                debug!(
                    criterion = self.until.name(),
                    iterations = iteration + 1,
                    succeeded,
                    "user simulation finished"
                );
                events.push(EvaluationEvent::Eval {
                    criterion: self.until.clone(),
                    result: PendingResult::ready(result),
                });
                break;
            }
        }

        Ok(events)
    }
}

impl fmt::Debug for UserSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSimulation")
            .field("until", &self.until)
            .field("max", &self.max)
            .finish()
    }
}

/// Working item produced while walking the segments.
#[derive(Debug)]
pub enum EvaluationEvent {
    Message(Message),
    Eval {
        criterion: CriterionHandle,
        result: PendingResult,
    },
}

impl EvaluationEvent {
    pub(crate) async fn resolve(self) -> Result<EvaluatedSegment, EvalError> {
        match self {
            EvaluationEvent::Message(message) => Ok(EvaluatedSegment::Message(message)),
            EvaluationEvent::Eval { criterion, result } => {
                let result = result.resolve(&criterion).await?;
                Ok(EvaluatedSegment::Eval { criterion, result })
            }
        }
    }
}

type CriterionTask = JoinHandle<Result<CriterionResult<ErasedOutput>, AdapterError>>;

/// Cancels the evaluation if the run is abandoned before it was joined.
#[derive(Debug)]
struct AbortOnDrop(CriterionTask);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A criterion verdict that may still be in flight.
#[derive(Debug)]
pub struct PendingResult {
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Ready(CriterionResult<ErasedOutput>),
    Running(AbortOnDrop),
}

impl PendingResult {
    pub(crate) fn ready(result: CriterionResult<ErasedOutput>) -> Self {
        Self {
            state: PendingState::Ready(result),
        }
    }

    /// Starts evaluating right away on the runtime; the outcome is collected by `resolve`.
    pub(crate) fn spawn(criterion: CriterionHandle, messages: Vec<Message>) -> Self {
        debug!(
            criterion = criterion.name(),
            messages = messages.len(),
            "starting criterion evaluation"
        );
        let task = tokio::spawn(async move { criterion.evaluate(&messages).await });
        Self {
            state: PendingState::Running(AbortOnDrop(task)),
        }
    }

    pub(crate) async fn resolve(
        self,
        criterion: &CriterionHandle,
    ) -> Result<CriterionResult<ErasedOutput>, EvalError> {
        match self.state {
            PendingState::Ready(result) => Ok(result),
            PendingState::Running(mut task) => match (&mut task.0).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(source)) => Err(EvalError::Criterion {
                    criterion: criterion.name().to_string(),
                    source,
                }),
                Err(source) => Err(EvalError::CriterionTask {
                    criterion: criterion.name().to_string(),
                    source,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        criteria::{MockCriterion, Status},
        providers::scripted::{ScriptedAgent, ScriptedUser},
    };

    use super::*;

    fn always(status: Status) -> Arc<MockCriterion<&'static str>> {
        Arc::new(MockCriterion::new(CriterionResult::new("verdict", Some(status))))
    }

    fn kinds(events: &[EvaluationEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|event| match event {
                EvaluationEvent::Message(_) => "message",
                EvaluationEvent::Eval { .. } => "eval",
            })
            .collect()
    }

    #[tokio::test]
    async fn message_ignores_transcript() {
        let agent = ScriptedAgent::new(Vec::<String>::new());
        let events = message(Message::user("Hi"))
            .evaluate(&agent, &[Message::assistant("earlier")])
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EvaluationEvent::Message(m) if *m == Message::user("Hi")));
    }

    #[tokio::test]
    async fn agent_response_sees_transcript() {
        let agent = ScriptedAgent::new(["Hello!"]);
        let transcript = vec![Message::system("Be brief."), Message::user("Hi")];

        let events = agent_response().evaluate(&agent, &transcript).await.unwrap();
        assert!(matches!(&events[0], EvaluationEvent::Message(m) if m.text() == "Hello!"));
        assert_eq!(agent.seen(), vec![transcript]);
    }

    #[tokio::test]
    async fn ai_eval_requires_prior_messages() {
        let agent = ScriptedAgent::new(Vec::<String>::new());
        let criterion = Arc::new(
            MockCriterion::new(CriterionResult::success(())).with_name("polite"),
        );

        let error = ai_eval(&criterion).evaluate(&agent, &[]).await.unwrap_err();
        match error {
            EvalError::CriterionBeforeMessages { criterion } => assert_eq!(criterion, "polite"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn simulation_stops_on_success() {
        let agent = ScriptedAgent::new(["A1", "A2", "A3"]);
        let user: Arc<dyn SyntheticUser> = Arc::new(ScriptedUser::new(["Q1", "Q2", "Q3"]));
        let until = always(Status::Success);

        let events = UserSimulation::new(user, &until)
            .with_max(3)
            .run(&agent, &[])
            .await
            .unwrap();

        assert_eq!(kinds(&events), ["message", "message", "eval"]);
        assert_eq!(agent.remaining(), 2);
    }

    #[tokio::test]
    async fn simulation_emits_failing_verdict_at_max() {
        let agent = ScriptedAgent::new(["A1", "A2"]);
        let user: Arc<dyn SyntheticUser> = Arc::new(ScriptedUser::new(["Q1", "Q2"]));
        let until = always(Status::Failure);

        let events = UserSimulation::new(user, &until)
            .with_max(2)
            .run(&agent, &[])
            .await
            .unwrap();

        assert_eq!(kinds(&events), ["message", "message", "message", "message", "eval"]);
        let EvaluationEvent::Eval { criterion, result } = events.into_iter().last().unwrap() else {
            panic!("last event should be the verdict");
        };
        let result = result.resolve(&criterion).await.unwrap();
        assert_eq!(result.status, Some(Status::Failure));
    }

    #[tokio::test]
    async fn simulated_user_only_sees_conversation() {
        let agent = ScriptedAgent::new(["A1"]);
        let scripted_user = Arc::new(ScriptedUser::new(["Q1"]));
        let user: Arc<dyn SyntheticUser> = scripted_user.clone();
        let until = always(Status::Success);
        let transcript = vec![
            Message::system("You are terse."),
            Message::user("Hi"),
            Message::assistant("Hello"),
        ];

        UserSimulation::new(user, &until)
            .run(&agent, &transcript)
            .await
            .unwrap();

        assert_eq!(
            scripted_user.seen(),
            vec![vec![Message::user("Hi"), Message::assistant("Hello")]]
        );
        let seen_by_agent = agent.seen();
        assert_eq!(seen_by_agent[0].len(), 4);
        assert_eq!(seen_by_agent[0][0], Message::system("You are terse."));
        assert_eq!(seen_by_agent[0][3], Message::user("Q1"));
    }

    #[tokio::test]
    async fn zero_max_emits_nothing() {
        let agent = ScriptedAgent::new(Vec::<String>::new());
        let user: Arc<dyn SyntheticUser> = Arc::new(ScriptedUser::new(Vec::<String>::new()));
        let until = always(Status::Success);

        let events = UserSimulation::new(user, &until)
            .with_max(0)
            .run(&agent, &[Message::user("Hi")])
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}
