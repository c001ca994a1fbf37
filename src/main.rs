use std::process::ExitCode;

use anyhow::Context;
use capsicum::{BuildConfig, BuildReport, Cli, Project};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// Timer that prints nothing; log lines stay short.
struct NoTimestamp;

impl FormatTime for NoTimestamp {
    fn format_time(&self, _w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        Ok(())
    }
}

fn init_tracing() {
    // only when CAPSICUM_LOG is set, e.g. CAPSICUM_LOG=capsicum_compiler=debug
    if let Ok(filter) = EnvFilter::try_from_env("CAPSICUM_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_timer(NoTimestamp)
            .with_writer(std::io::stderr)
            .compact()
            .init();
        tracing::debug!("tracing initialized");
    }
}

fn run(cli: &Cli) -> anyhow::Result<BuildReport> {
    let config = BuildConfig::resolve(cli).context("invalid configuration")?;
    let output_dir = config.output_dir.clone();
    let project = Project::from_config(config).context("failed to load project inputs")?;
    project
        .run()
        .with_context(|| format!("build into {} failed", output_dir.display()))
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) => {
            println!("{report}");
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
