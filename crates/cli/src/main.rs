// # -----------------------------
// # crates/cli/src/main.rs
// # -----------------------------
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use systest_common::{HarnessCfg, LOG_TARGET};
use tracing::{debug, info};

mod logging;
mod suite;
mod test_runner;

#[derive(Parser, Debug)]
#[command(
    name = "fastddsspy-systest",
    version,
    about = "System tests for the Fast DDS Spy command-line tool",
    long_about = None
)]
struct Cli {
    /// Path to the fastddsspy executable (bare names are looked up in PATH)
    #[arg(short = 'e', long = "exe")]
    exe: PathBuf,

    /// Print debug-level logs
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,
}

fn main() {
    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    }
}

fn real_main() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let cfg = HarnessCfg::from_env();
    debug!(target: LOG_TARGET, "harness configuration: {cfg:?}");
    let exe = suite::resolve_exe(&cli.exe);
    info!(target: LOG_TARGET, "Tool under test: {}", exe.display());

    let cases = suite::select_cases(&cfg).context("load test suite")?;
    let summary = test_runner::run_suite(&cases, &exe, &cfg);
    Ok(summary.exit_code())
}
