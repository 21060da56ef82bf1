use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    criteria::Status,
    evaluation::{EvalEntry, EvaluationRun},
    types::Message,
};

#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub total: usize,
    pub passed: usize,
    pub cases: Vec<CaseReport>,
}

impl EvalReport {
    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Outcome of one scenario. Serialized as a single JSONL line by the replay binary.
#[derive(Debug, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub pass: bool,
    pub failures: Vec<String>,
    pub verdicts: Vec<VerdictReport>,
    pub transcript: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictReport {
    pub criterion: String,
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<EvalEntry<'_>> for VerdictReport {
    fn from(entry: EvalEntry<'_>) -> Self {
        Self {
            criterion: entry.criterion.name().to_string(),
            status: entry.result.status,
            reason: entry.result.reason.clone(),
            error: entry.result.error.clone(),
        }
    }
}

impl VerdictReport {
    pub(crate) fn failure_line(&self) -> Option<String> {
        if self.status != Some(Status::Failure) {
            return None;
        }
        Some(match &self.reason {
            Some(reason) => format!("{} failed: {}", self.criterion, reason),
            None => format!("{} failed", self.criterion),
        })
    }
}

pub(crate) fn verdicts(run: &EvaluationRun) -> Vec<VerdictReport> {
    run.evals().map(VerdictReport::from).collect()
}
