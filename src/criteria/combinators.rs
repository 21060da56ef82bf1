use async_trait::async_trait;

use crate::{
    criteria::{Criterion, CriterionResult, Status},
    error::AdapterError,
    types::Message,
};

/// Flips the status of the inner criterion. Undetermined stays undetermined.
#[derive(Debug, Clone)]
pub struct Negate<C> {
    name: String,
    inner: C,
}

impl<C: Criterion> Negate<C> {
    pub fn new(inner: C) -> Self {
        Self {
            name: format!("not({})", inner.name()),
            inner,
        }
    }
}

#[async_trait]
impl<C: Criterion> Criterion for Negate<C> {
    type Output = C::Output;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<C::Output>, AdapterError> {
        let mut result = self.inner.evaluate(messages).await?;
        result.status = result.status.map(Status::flip);
        Ok(result)
    }
}

/// Runs both criteria over the same transcript and pairs their outputs.
#[derive(Debug, Clone)]
pub struct And<A, B> {
    name: String,
    left: A,
    right: B,
}

impl<A: Criterion, B: Criterion> And<A, B> {
    pub fn new(left: A, right: B) -> Self {
        Self {
            name: format!("and({}, {})", left.name(), right.name()),
            left,
            right,
        }
    }
}

#[async_trait]
impl<A: Criterion, B: Criterion> Criterion for And<A, B> {
    type Output = (A::Output, B::Output);

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<Self::Output>, AdapterError> {
        let (left, right) = futures_util::future::try_join(
            self.left.evaluate(messages),
            self.right.evaluate(messages),
        )
        .await?;

        let status = match (left.status, right.status) {
            (Some(Status::Success), Some(Status::Success)) => Some(Status::Success),
            (Some(Status::Failure), _) | (_, Some(Status::Failure)) => Some(Status::Failure),
            _ => None,
        };

        Ok(CriterionResult {
            output: (left.output, right.output),
            reason: join_optional(left.reason, right.reason),
            error: join_optional(left.error, right.error),
            status,
        })
    }
}

fn join_optional(left: Option<String>, right: Option<String>) -> Option<String> {
    match (left, right) {
        (Some(left), Some(right)) => Some(format!("{left}; {right}")),
        (left, right) => left.or(right),
    }
}

/// Maps the output of the inner criterion, leaving status and reason untouched.
#[derive(Clone)]
pub struct Pipe<C, F> {
    name: String,
    inner: C,
    map: F,
}

impl<C, F, U> Pipe<C, F>
where
    C: Criterion,
    F: Fn(C::Output) -> U + Send + Sync,
{
    pub fn new(inner: C, map: F) -> Self {
        Self {
            name: format!("pipe({})", inner.name()),
            inner,
            map,
        }
    }
}

#[async_trait]
impl<C, F, U> Criterion for Pipe<C, F>
where
    C: Criterion,
    F: Fn(C::Output) -> U + Send + Sync,
    U: Send + Sync + 'static,
{
    type Output = U;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, messages: &[Message]) -> Result<CriterionResult<U>, AdapterError> {
        let result = self.inner.evaluate(messages).await?;
        Ok(result.map(&self.map))
    }
}

pub trait CriterionExt: Criterion + Sized {
    fn negate(self) -> Negate<Self> {
        Negate::new(self)
    }

    fn and<B: Criterion>(self, other: B) -> And<Self, B> {
        And::new(self, other)
    }

    fn pipe<F, U>(self, map: F) -> Pipe<Self, F>
    where
        F: Fn(Self::Output) -> U + Send + Sync,
    {
        Pipe::new(self, map)
    }
}

impl<C: Criterion> CriterionExt for C {}
