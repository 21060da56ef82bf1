//! Scenario files and the runner that replays them.

pub mod report;
pub mod runner;
pub mod scenario;

pub use report::{CaseReport, EvalReport, VerdictReport};
pub use runner::EvalRunner;
pub use scenario::{load_scenarios, Scenario, ScenarioDocument};
