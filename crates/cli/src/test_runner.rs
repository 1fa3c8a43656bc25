use std::path::Path;
use systest_common::{CaseSpec, HarnessCfg, LOG_TARGET};
use systest_tools::{CommandPeer, NoopPeer, PeerLauncher, RunnerError, Termination, TestCase};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// The tool ran but did not end with status 0.
    Failed(String),
    /// The harness could not run the case (spawn failure, pipe error).
    Error(String),
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<CaseReport>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.verdict.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.passed()
    }

    /// Names of the cases that did not pass, in run order.
    pub fn failed_names(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.verdict.passed())
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 { 0 } else { 1 }
    }
}

fn peer_for(cfg: &HarnessCfg) -> Box<dyn PeerLauncher> {
    if cfg.peer.is_empty() {
        return Box::new(NoopPeer);
    }
    match CommandPeer::new(cfg.peer.iter(), cfg.grace) {
        Ok(peer) => Box::new(peer),
        Err(e) => {
            warn!(target: LOG_TARGET, "unusable dds peer command: {e}");
            Box::new(NoopPeer)
        }
    }
}

fn verdict_for(case: &TestCase, t: Termination) -> Verdict {
    if case.valid_output_tool(t.return_code()) {
        Verdict::Passed
    } else {
        Verdict::Failed(format!("tool {}", t.diagnostic()))
    }
}

/// Drives one case to a terminal state. Only harness errors are returned as `Err`.
pub fn run_case(case: &mut TestCase) -> Result<Verdict, RunnerError> {
    let mut proc = case.run()?;
    let termination = if case.one_shot {
        proc.wait_unbounded()?
    } else if case.is_stop_tool(&mut proc)? {
        warn!(target: LOG_TARGET, "{}: tool stopped before receiving a command", case.name);
        proc.wait_unbounded()?
    } else {
        if let Some(valid) = case.send_command_tool(&mut proc)? {
            debug!(target: LOG_TARGET, "{}: tool finished after command, valid={valid}", case.name);
        }
        case.stop_tool(&mut proc)?
    };
    Ok(verdict_for(case, termination))
}

pub fn run_suite(specs: &[CaseSpec], exe: &Path, cfg: &HarnessCfg) -> RunSummary {
    let mut summary = RunSummary::default();
    for spec in specs {
        let mut case = TestCase::from_spec(spec)
            .with_exec(exe)
            .with_grace(cfg.grace);
        if spec.dds {
            case = case.with_peer(peer_for(cfg));
        }
        let verdict = match run_case(&mut case) {
            Ok(v) => v,
            Err(e) => Verdict::Error(e.to_string()),
        };
        if let Err(e) = case.stop_dds() {
            warn!(target: LOG_TARGET, "{}: failed to stop dds peer: {e}", spec.name);
        }
        match &verdict {
            Verdict::Passed => info!(target: LOG_TARGET, "Test {} PASS", spec.name),
            Verdict::Failed(why) => error!(target: LOG_TARGET, "Test {} FAIL: {why}", spec.name),
            Verdict::Error(why) => error!(target: LOG_TARGET, "Test {} ERROR: {why}", spec.name),
        }
        summary.reports.push(CaseReport {
            name: spec.name.clone(),
            verdict,
        });
    }
    info!(
        target: LOG_TARGET,
        "{}/{} test cases passed",
        summary.passed(),
        summary.reports.len()
    );
    let failed = summary.failed_names();
    if !failed.is_empty() {
        error!(target: LOG_TARGET, "Failed cases: {}", failed.join(", "));
    }
    summary
}
