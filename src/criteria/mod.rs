use std::{any::Any, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::AdapterError, types::Message};

pub mod assertion;
pub mod combinators;
pub mod faithfulness;
pub mod mock;
pub mod pattern;
pub mod scorer;
pub mod tool_calls;

pub use assertion::AiAssertion;
pub use combinators::{And, CriterionExt, Negate, Pipe};
pub use faithfulness::{ClaimVerdict, FaithfulnessCriterion, FaithfulnessOutput};
pub use mock::MockCriterion;
pub use pattern::ReplyMatches;
pub use scorer::{Score, Scorer, ScorerCriterion};
pub use tool_calls::{
    extract_tool_calls, ExpectedToolCall, ToolCallsCriterion, ToolsCalledCriterion,
    ToolsCalledOutput,
};

/// Outcome of a criterion that reached a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Status::Success
        } else {
            Status::Failure
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Status::Success => Status::Failure,
            Status::Failure => Status::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult<O> {
    pub output: O,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Fault raised while evaluating, kept here so the rest of the run stays visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `None` when no verdict was reached. Not the same as a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl<O> CriterionResult<O> {
    pub fn new(output: O, status: Option<Status>) -> Self {
        Self {
            output,
            reason: None,
            error: None,
            status,
        }
    }

    pub fn success(output: O) -> Self {
        Self::new(output, Some(Status::Success))
    }

    pub fn failure(output: O) -> Self {
        Self::new(output, Some(Status::Failure))
    }

    pub fn undetermined(output: O) -> Self {
        Self::new(output, None)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(Status::Success)
    }

    pub fn map<U>(self, f: impl FnOnce(O) -> U) -> CriterionResult<U> {
        CriterionResult {
            output: f(self.output),
            reason: self.reason,
            error: self.error,
            status: self.status,
        }
    }
}

/// Type-erased criterion output, recovered with [`CriterionResult::downcast`].
pub type ErasedOutput = Arc<dyn Any + Send + Sync>;

impl CriterionResult<ErasedOutput> {
    pub fn downcast<O: Any>(&self) -> Option<CriterionResult<&O>> {
        let output = self.output.downcast_ref::<O>()?;
        Some(CriterionResult {
            output,
            reason: self.reason.clone(),
            error: self.error.clone(),
            status: self.status,
        })
    }
}

/// A named judgment over a transcript.
///
/// Expected negative outcomes are reported as [`Status::Failure`]. Returning `Err` aborts the
/// whole evaluation run, so faults that should leave the other results visible belong in
/// [`CriterionResult::error`] instead.
#[async_trait]
pub trait Criterion: Send + Sync {
    type Output: Send + Sync + 'static;

    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<Self::Output>, AdapterError>;
}

#[async_trait]
trait ErasedCriterion: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate_erased(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<ErasedOutput>, AdapterError>;
}

#[async_trait]
impl<C> ErasedCriterion for C
where
    C: Criterion,
{
    fn name(&self) -> &str {
        Criterion::name(self)
    }

    async fn evaluate_erased(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<ErasedOutput>, AdapterError> {
        let result = self.evaluate(messages).await?;
        Ok(result.map(|output| Arc::new(output) as ErasedOutput))
    }
}

/// A criterion as stored in segments and results.
///
/// Two handles are the same criterion only when they point at the same allocation; names
/// play no part in identity.
#[derive(Clone)]
pub struct CriterionHandle {
    inner: Arc<dyn ErasedCriterion>,
}

impl CriterionHandle {
    pub fn new<C>(criterion: &Arc<C>) -> Self
    where
        C: Criterion + 'static,
    {
        let inner: Arc<dyn ErasedCriterion> = criterion.clone();
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn is<C>(&self, criterion: &Arc<C>) -> bool
    where
        C: Criterion + 'static,
    {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(criterion))
    }

    pub fn same_as(&self, other: &CriterionHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    pub async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<ErasedOutput>, AdapterError> {
        self.inner.evaluate_erased(messages).await
    }
}

impl<C> From<&Arc<C>> for CriterionHandle
where
    C: Criterion + 'static,
{
    fn from(criterion: &Arc<C>) -> Self {
        Self::new(criterion)
    }
}

impl fmt::Debug for CriterionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriterionHandle")
            .field("name", &self.name())
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn identity_ignores_names() {
        let first = Arc::new(MockCriterion::new(CriterionResult::success(1)).with_name("same"));
        let second = Arc::new(MockCriterion::new(CriterionResult::success(1)).with_name("same"));

        let handle = CriterionHandle::new(&first);
        assert!(handle.is(&first));
        assert!(!handle.is(&second));
        assert!(handle.same_as(&CriterionHandle::new(&first)));
        assert!(!handle.same_as(&CriterionHandle::new(&second)));
    }

    #[tokio::test]
    async fn erased_output_downcasts_to_original_type() {
        let criterion = Arc::new(MockCriterion::new(
            CriterionResult::success(vec!["a".to_string()]).with_reason("fine"),
        ));
        let handle = CriterionHandle::new(&criterion);

        let result = handle.evaluate(&[Message::user("Hi")]).await.unwrap();
        let typed = result.downcast::<Vec<String>>().expect("output type");
        assert_eq!(typed.output, &vec!["a".to_string()]);
        assert_eq!(typed.reason.as_deref(), Some("fine"));
        assert!(result.downcast::<String>().is_none());
    }

    #[test]
    fn undetermined_is_not_failure() {
        let result = CriterionResult::undetermined(());
        assert!(!result.is_success());
        assert_ne!(result.status, Some(Status::Failure));
    }
}
