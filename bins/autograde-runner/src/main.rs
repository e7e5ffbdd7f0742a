mod aggregator;
mod artifacts;
mod classifier;
mod config;
mod feedback;
mod manifest;
mod suite;


use autograde_common::config::HarnessConfig;
use clap::Parser;
use manifest::ManifestSuite;
use std::path::PathBuf;
use suite::TestSuite;
use tracing::{error, info, info_span};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "autograde-runner")]
#[command(about = "Run an instructor test suite against a submission and write the grading result", long_about = None)]
struct Cli {
    /// Test suite manifest (JSON)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Harness config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding side-channel artifacts
    #[arg(long)]
    run_dir: Option<PathBuf>,

    /// Student submission, listed in feedback when it raises
    #[arg(long)]
    student_code: Option<PathBuf>,

    /// Stop starting tests once grading is marked complete
    #[arg(long, default_value = "false")]
    stop_when_done: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let (mut config, config_error) = match config::load_with_overrides(cli.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => {
            error!(error = %e, "Failed to load harness config; using defaults");
            (HarnessConfig::new().with_env_overrides(), Some(e))
        }
    };
    if let Some(run_dir) = cli.run_dir {
        config.run_dir = run_dir;
    }
    if let Some(student_code) = cli.student_code {
        config.student_code = Some(student_code);
    }
    config.stop_when_done |= cli.stop_when_done;

    let run_id = Uuid::new_v4();
    let _span = info_span!("grading_run", run_id = %run_id).entered();
    info!(run_dir = %config.run_dir.display(), manifest = %cli.manifest.display(), "Autograder starting");

    let manifest_path = cli.manifest;
    let result = aggregator::run_with_safety_net(&config, move || -> anyhow::Result<Box<dyn TestSuite>> {
        if let Some(e) = config_error {
            return Err(e);
        }
        let suite = ManifestSuite::load(&manifest_path)?;
        Ok(Box::new(suite) as Box<dyn TestSuite>)
    })
    .map_err(|e| {
        error!(error = %e, "Could not write any grading result");
        e
    })?;

    info!(
        succeeded = result.succeeded,
        score = result.score,
        "Autograder finished"
    );
    Ok(())
}
