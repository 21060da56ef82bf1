use pruefstand::{
    criteria::Status,
    eval::{load_scenarios, EvalRunner},
};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

#[test]
fn loads_yaml_and_json_sorted_by_name() {
    let scenarios = load_scenarios(FIXTURES).expect("fixtures load");

    let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["refund-policy", "weather-lookup"]);
    assert_eq!(
        scenarios[1].description.as_deref(),
        Some("The agent calls the weather tool once the user names a city.")
    );
}

#[test]
fn loads_a_single_file() {
    let scenarios =
        load_scenarios(format!("{FIXTURES}/weather.yaml")).expect("single file loads");
    assert_eq!(scenarios.len(), 1);
    assert_eq!(scenarios[0].segments.len(), 5);
}

#[test]
fn missing_paths_are_io_errors() {
    let error = load_scenarios(format!("{FIXTURES}/missing.yaml")).unwrap_err();
    assert!(matches!(error, pruefstand::ScenarioError::Io { .. }));
}

#[tokio::test]
async fn replays_fixture_scenarios() {
    let scenarios = load_scenarios(FIXTURES).expect("fixtures load");
    let report = EvalRunner::new().run(&scenarios).await;

    assert_eq!(report.total, 2);
    assert_eq!(report.passed, 1);

    let refund = &report.cases[0];
    assert!(!refund.pass);
    assert_eq!(refund.failures, ["mentions window failed: last reply does not match /30 days/"]);

    let weather = &report.cases[1];
    assert!(weather.pass, "failures: {:?}", weather.failures);
    assert_eq!(weather.transcript.len(), 5);
    let statuses: Vec<_> = weather.verdicts.iter().map(|v| v.status).collect();
    assert_eq!(statuses, [Some(Status::Success), Some(Status::Success)]);
    assert_eq!(weather.verdicts[1].criterion, "tools called: get_weather");
}

#[tokio::test]
async fn case_reports_serialize_as_json_lines() {
    let scenarios = load_scenarios(format!("{FIXTURES}/refund.json")).expect("fixture loads");
    let report = EvalRunner::new().run(&scenarios).await;

    let line = serde_json::to_value(&report.cases[0]).expect("serializable");
    assert_eq!(line["name"], "refund-policy");
    assert_eq!(line["pass"], false);
    assert_eq!(line["transcript"][1]["role"], "assistant");
    assert_eq!(line["verdicts"][0]["status"], "failure");
    assert!(line["started_at"].is_string());
}
