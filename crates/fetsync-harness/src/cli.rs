use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fetsync_runtime::logging::{self, LogFormat};

use crate::error::{HarnessError, Result};
use crate::runner::ScenarioRunner;
use crate::scenario::Scenario;

/// Exit code when a replay finds a leak or a failed expectation.
pub const EXIT_INVARIANT_VIOLATED: i32 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "fetsync-harness",
    about = "Replay explanation-display scenarios on virtual time and check for leaks",
    version
)]
pub struct Cli {
    /// Emit engine logs to stderr (filtered by FETSYNC_LOG).
    #[arg(long, value_enum, global = true)]
    pub log: Option<LogArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogArg {
    Json,
    Compact,
}

impl From<LogArg> for LogFormat {
    fn from(arg: LogArg) -> Self {
        match arg {
            LogArg::Json => Self::Json,
            LogArg::Compact => Self::Compact,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay one scenario and print its frame log.
    Run(RunArgs),

    /// Replay scenarios and fail if any leaks or misses an expectation.
    Check(CheckArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Scenario JSON file.
    pub scenario: PathBuf,

    /// Print JSONL (one object per frame and delivery, then a summary).
    #[arg(long)]
    pub jsonl: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Scenario JSON files.
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli, &mut std::io::stdout().lock())
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    if let Some(format) = cli.log {
        logging::init(format.into())?;
    }
    match cli.command {
        Commands::Run(args) => run_scenario(&args, out),
        Commands::Check(args) => check_scenarios(&args, out),
    }
}

fn run_scenario(args: &RunArgs, out: &mut dyn Write) -> Result<()> {
    let report = ScenarioRunner::new(Scenario::from_file(&args.scenario)?).run()?;
    if args.jsonl {
        out.write_all(report.to_jsonl()?.as_bytes())?;
    } else {
        out.write_all(report.render_text().as_bytes())?;
    }
    if report.passed() {
        Ok(())
    } else {
        Err(HarnessError::exit(
            EXIT_INVARIANT_VIOLATED,
            format!("scenario '{}' failed", report.name),
        ))
    }
}

fn check_scenarios(args: &CheckArgs, out: &mut dyn Write) -> Result<()> {
    let mut failed = Vec::new();
    for path in &args.scenarios {
        let report = ScenarioRunner::new(Scenario::from_file(path)?).run()?;
        let verdict = if report.passed() { "ok" } else { "FAILED" };
        writeln!(
            out,
            "{verdict:<6} {} ({} frames, {} leaks, {} failed expectations)",
            path.display(),
            report.frames.len(),
            report.leaks.len(),
            report.failures.len()
        )?;
        if !report.passed() {
            failed.push(path.display().to_string());
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::exit(
            EXIT_INVARIANT_VIOLATED,
            format!("{} scenario(s) failed: {}", failed.len(), failed.join(", ")),
        ))
    }
}
