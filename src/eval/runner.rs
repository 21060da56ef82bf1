use std::{sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    agents::Agent,
    eval::{
        report::{self, CaseReport, EvalReport},
        scenario::ScenarioDocument,
    },
    evaluation::evaluate,
    types::Message,
};

/// Replays scenario documents against their scripted agents and collects a report.
#[derive(Debug, Default, Clone)]
pub struct EvalRunner {
    fail_fast: bool,
}

impl EvalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after the first failing scenario.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub async fn run(&self, scenarios: &[ScenarioDocument]) -> EvalReport {
        let mut cases = Vec::new();
        let mut passed = 0;

        for document in scenarios {
            let case = self.run_scenario(document).await;
            if case.pass {
                passed += 1;
            }
            let stop = self.fail_fast && !case.pass;
            cases.push(case);
            if stop {
                warn!(scenario = %document.name, "stopping after first failure");
                break;
            }
        }

        EvalReport {
            total: scenarios.len(),
            passed,
            cases,
        }
    }

    async fn run_scenario(&self, document: &ScenarioDocument) -> CaseReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut failures = Vec::new();
        let mut verdicts = Vec::new();
        let mut transcript: Vec<Message> = Vec::new();

        match document.build() {
            Err(error) => failures.push(format!("invalid scenario: {error}")),
            Ok(scenario) => {
                let agent: Arc<dyn Agent> = scenario.agent;
                match evaluate(agent, &scenario.segments).await {
                    Ok(run) => {
                        verdicts = report::verdicts(&run);
                        failures.extend(verdicts.iter().filter_map(|v| v.failure_line()));
                        transcript = run.messages().into_iter().cloned().collect();
                    }
                    Err(error) => failures.push(error.to_string()),
                }
            }
        }

        let pass = failures.is_empty();
        info!(
            scenario = %document.name,
            pass,
            verdicts = verdicts.len(),
            "scenario finished"
        );

        CaseReport {
            name: document.name.clone(),
            pass,
            failures,
            verdicts,
            transcript,
            started_at,
            duration_ms: clock.elapsed().as_millis(),
        }
    }
}
