use async_trait::async_trait;
use regex::Regex;

use crate::{
    criteria::{Criterion, CriterionResult},
    error::AdapterError,
    types::Message,
};

/// Passes when the most recent assistant reply matches a regular expression.
///
/// The output is the matched text, if any.
#[derive(Debug, Clone)]
pub struct ReplyMatches {
    name: String,
    pattern: Regex,
}

impl ReplyMatches {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::from_regex(Regex::new(pattern)?))
    }

    pub fn from_regex(pattern: Regex) -> Self {
        Self {
            name: format!("reply matches /{}/", pattern.as_str()),
            pattern,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Criterion for ReplyMatches {
    type Output = Option<String>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &self,
        messages: &[Message],
    ) -> Result<CriterionResult<Option<String>>, AdapterError> {
        let Some(reply) = messages.iter().rev().find_map(Message::as_assistant) else {
            return Ok(CriterionResult::failure(None).with_reason("no assistant reply yet"));
        };

        Ok(match self.pattern.find(&reply.content) {
            Some(found) => CriterionResult::success(Some(found.as_str().to_string())),
            None => CriterionResult::failure(None)
                .with_reason(format!("last reply does not match /{}/", self.pattern.as_str())),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::criteria::Status;

    use super::*;

    #[tokio::test]
    async fn checks_only_the_latest_reply() {
        let criterion = ReplyMatches::new(r"(?i)\bparis\b").unwrap();
        assert_eq!(criterion.name(), r"reply matches /(?i)\bparis\b/");

        let answered = vec![
            Message::user("Capital of France?"),
            Message::assistant("Paris."),
            Message::user("And Germany?"),
        ];
        let result = criterion.evaluate(&answered).await.unwrap();
        assert_eq!(result.status, Some(Status::Success));
        assert_eq!(result.output.as_deref(), Some("Paris"));

        let moved_on = vec![
            Message::assistant("Paris."),
            Message::user("And Germany?"),
            Message::assistant("Berlin."),
        ];
        let result = criterion.evaluate(&moved_on).await.unwrap();
        assert_eq!(result.status, Some(Status::Failure));
    }

    #[tokio::test]
    async fn fails_without_any_reply() {
        let criterion = ReplyMatches::new("hello").unwrap();
        let result = criterion.evaluate(&[Message::user("hello")]).await.unwrap();
        assert_eq!(result.status, Some(Status::Failure));
        assert_eq!(result.reason.as_deref(), Some("no assistant reply yet"));
    }

    #[test]
    fn rejects_invalid_patterns() {
        assert!(ReplyMatches::new("(unclosed").is_err());
    }
}
