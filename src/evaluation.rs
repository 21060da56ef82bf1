use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::{
    agents::AgentSource,
    criteria::{Criterion, CriterionHandle, CriterionResult, ErasedOutput, Status},
    error::EvalError,
    segment::{EvaluationEvent, Segment},
    types::Message,
};

/// A resolved entry of an evaluation run.
#[derive(Debug, Clone)]
pub enum EvaluatedSegment {
    Message(Message),
    Eval {
        criterion: CriterionHandle,
        result: CriterionResult<ErasedOutput>,
    },
}

impl EvaluatedSegment {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            EvaluatedSegment::Message(message) => Some(message),
            EvaluatedSegment::Eval { .. } => None,
        }
    }

    pub fn as_eval(&self) -> Option<EvalEntry<'_>> {
        match self {
            EvaluatedSegment::Message(_) => None,
            EvaluatedSegment::Eval { criterion, result } => Some(EvalEntry { criterion, result }),
        }
    }
}

/// Borrowed view of one criterion verdict.
#[derive(Debug, Clone, Copy)]
pub struct EvalEntry<'a> {
    pub criterion: &'a CriterionHandle,
    pub result: &'a CriterionResult<ErasedOutput>,
}

/// Verdicts grouped by status. Results without a status land in `unknown`.
#[derive(Debug, Default)]
pub struct ResultsByStatus<'a> {
    pub success: Vec<EvalEntry<'a>>,
    pub failure: Vec<EvalEntry<'a>>,
    pub unknown: Vec<EvalEntry<'a>>,
}

impl<'a> ResultsByStatus<'a> {
    pub fn get(&self, status: Option<Status>) -> &[EvalEntry<'a>] {
        match status {
            Some(Status::Success) => &self.success,
            Some(Status::Failure) => &self.failure,
            None => &self.unknown,
        }
    }
}

/// Everything a finished run produced, in emission order.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    results: Vec<EvaluatedSegment>,
}

impl EvaluationRun {
    pub fn results(&self) -> &[EvaluatedSegment] {
        &self.results
    }

    pub fn into_results(self) -> Vec<EvaluatedSegment> {
        self.results
    }

    /// The transcript the run produced.
    pub fn messages(&self) -> Vec<&Message> {
        self.results
            .iter()
            .filter_map(EvaluatedSegment::as_message)
            .collect()
    }

    pub fn evals(&self) -> impl Iterator<Item = EvalEntry<'_>> {
        self.results.iter().filter_map(EvaluatedSegment::as_eval)
    }

    pub fn results_by_status(&self) -> ResultsByStatus<'_> {
        let mut grouped = ResultsByStatus::default();
        for entry in self.evals() {
            match entry.result.status {
                Some(Status::Success) => grouped.success.push(entry),
                Some(Status::Failure) => grouped.failure.push(entry),
                None => grouped.unknown.push(entry),
            }
        }
        grouped
    }

    /// True unless some verdict failed. A run without verdicts succeeds.
    pub fn success(&self) -> bool {
        self.evals()
            .all(|entry| entry.result.status != Some(Status::Failure))
    }

    /// Every verdict of this exact criterion instance, in emission order.
    pub fn get_results<C>(&self, criterion: &Arc<C>) -> Vec<CriterionResult<&C::Output>>
    where
        C: Criterion + 'static,
    {
        self.evals()
            .filter(|entry| entry.criterion.is(criterion))
            .filter_map(|entry| entry.result.downcast::<C::Output>())
            .collect()
    }

    pub fn get_result<C>(&self, criterion: &Arc<C>) -> Option<CriterionResult<&C::Output>>
    where
        C: Criterion + 'static,
    {
        self.evals()
            .filter(|entry| entry.criterion.is(criterion))
            .find_map(|entry| entry.result.downcast::<C::Output>())
    }

    /// Like [`get_result`](Self::get_result), but a criterion that never ran is an error.
    /// Prefer `get_results` where an absent criterion is a legitimate outcome.
    pub fn get_result_or_err<C>(
        &self,
        criterion: &Arc<C>,
    ) -> Result<CriterionResult<&C::Output>, EvalError>
    where
        C: Criterion + 'static,
    {
        self.get_result(criterion)
            .ok_or_else(|| EvalError::MissingResult {
                criterion: criterion.name().to_string(),
            })
    }
}

/// Runs `segments` in order against the agent and collects every message and verdict.
///
/// Each segment sees the messages produced by the segments before it. Criterion evaluations
/// start as soon as their segment is reached and are joined once every segment has run. The
/// first error aborts the run; evaluations still in flight are cancelled.
///
/// Must be called from within a Tokio runtime.
pub async fn evaluate(
    agent: impl Into<AgentSource>,
    segments: &[Segment],
) -> Result<EvaluationRun, EvalError> {
    let agent = agent.into().resolve().await.map_err(EvalError::Agent)?;

    let mut events: Vec<EvaluationEvent> = Vec::new();
    let mut transcript: Vec<Message> = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        debug!(
            index,
            kind = segment.kind(),
            messages = transcript.len(),
            "evaluating segment"
        );
        let produced = segment.evaluate(agent.as_ref(), &transcript).await?;

        transcript.extend(produced.iter().filter_map(|event| match event {
            EvaluationEvent::Message(message) => Some(message.clone()),
            EvaluationEvent::Eval { .. } => None,
        }));
        events.extend(produced);
    }

    let results = try_join_all(events.into_iter().map(EvaluationEvent::resolve)).await?;
    let run = EvaluationRun { results };

    info!(
        segments = segments.len(),
        messages = transcript.len(),
        verdicts = run.evals().count(),
        success = run.success(),
        "evaluation finished"
    );
    Ok(run)
}
