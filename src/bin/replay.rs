use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::Parser;
use pruefstand::eval::{load_scenarios, EvalRunner, ScenarioDocument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pruefstand-replay")]
#[command(about = "Replay scripted evaluation scenarios and report their verdicts")]
struct Args {
    /// Path to a scenarios directory or a single scenario file (YAML/JSON)
    #[arg(long, default_value = "scenarios")]
    scenarios: PathBuf,

    /// Output path for JSONL results
    #[arg(long)]
    out: Option<PathBuf>,

    /// Run only scenarios whose name contains this substring (repeatable)
    #[arg(long)]
    filter: Vec<String>,

    /// Stop at the first failing scenario
    #[arg(long)]
    fail_fast: bool,
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn default_out_path() -> PathBuf {
    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    PathBuf::from(format!("runs/{ts}.jsonl"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let scenarios = load_scenarios(&args.scenarios)?;
    let scenarios = filter_scenarios(scenarios, &args.filter);
    if scenarios.is_empty() {
        eprintln!("No scenarios matched.");
        std::process::exit(2);
    }

    let report = EvalRunner::new()
        .with_fail_fast(args.fail_fast)
        .run(&scenarios)
        .await;

    let out_path = args.out.unwrap_or_else(default_out_path);
    ensure_parent_dir(&out_path)?;
    let mut writer = BufWriter::new(fs::File::create(&out_path)?);

    for case in &report.cases {
        if !case.pass {
            eprintln!("FAIL {}", case.name);
            for f in &case.failures {
                eprintln!("  - {f}");
            }
        }
        serde_json::to_writer(&mut writer, case)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    println!(
        "Results: {}/{} passed, Output: {}",
        report.passed,
        report.total,
        out_path.display()
    );

    if report.all_passed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn filter_scenarios(
    mut scenarios: Vec<ScenarioDocument>,
    filters: &[String],
) -> Vec<ScenarioDocument> {
    if filters.is_empty() {
        return scenarios;
    }
    scenarios.retain(|s| filters.iter().any(|f| s.name.contains(f)));
    scenarios
}
