use async_trait::async_trait;

use crate::{
    criteria::{Criterion, CriterionResult},
    error::AdapterError,
    types::Message,
};

/// Always answers with the result it was built with.
#[derive(Debug, Clone)]
pub struct MockCriterion<O> {
    name: String,
    result: CriterionResult<O>,
}

impl<O> MockCriterion<O> {
    pub fn new(result: CriterionResult<O>) -> Self {
        Self {
            name: "Mock".to_string(),
            result,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<O> Criterion for MockCriterion<O>
where
    O: Clone + Send + Sync + 'static,
{
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _messages: &[Message]) -> Result<CriterionResult<O>, AdapterError> {
        Ok(self.result.clone())
    }
}
