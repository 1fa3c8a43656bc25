use crate::error::{Result, RunnerError};
use crate::exit::{valid_output_tool, Termination};
use crate::peer::{NoopPeer, PeerHandle, PeerLauncher};
use crate::process::ToolProcess;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use systest_common::{CaseSpec, DEFAULT_GRACE_SECS, LOG_TARGET};
use tracing::{debug, info, warn};

/// Input the tool recognises as a request to shut down.
pub const EXIT_COMMAND: &[u8] = b"exit\n";

/// argv for one invocation: the payload rides along as the single argument in
/// one-shot mode, interactive runs get the bare executable.
pub fn build_argv(one_shot: bool, exec_spy: &Path, arguments: &str) -> Vec<OsString> {
    let mut argv = vec![exec_spy.as_os_str().to_os_string()];
    if one_shot {
        argv.push(OsString::from(arguments));
    }
    argv
}

/// One scenario run against the tool under test.
pub struct TestCase {
    pub name: String,
    pub one_shot: bool,
    pub dds: bool,
    pub arguments: String,
    pub exec_spy: PathBuf,
    pub grace: Duration,
    peer: Box<dyn PeerLauncher>,
    peer_handle: Option<PeerHandle>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, one_shot: bool, dds: bool, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            one_shot,
            dds,
            arguments: arguments.into(),
            exec_spy: PathBuf::new(),
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            peer: Box::new(NoopPeer),
            peer_handle: None,
        }
    }

    pub fn from_spec(spec: &CaseSpec) -> Self {
        Self::new(spec.name.clone(), spec.one_shot, spec.dds, spec.arguments.clone())
    }

    pub fn with_exec(mut self, exec_spy: impl Into<PathBuf>) -> Self {
        self.exec_spy = exec_spy.into();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_peer(mut self, peer: Box<dyn PeerLauncher>) -> Self {
        self.peer = peer;
        self
    }

    /// The argv `run_tool` would spawn right now.
    pub fn command(&self) -> Vec<OsString> {
        build_argv(self.one_shot, &self.exec_spy, &self.arguments)
    }

    pub fn run(&mut self) -> Result<ToolProcess> {
        if self.dds {
            self.run_dds()?;
        }
        self.run_tool()
    }

    /// Spawns the tool. One-shot runs are waited on before returning; a run
    /// that outlives the grace window is killed and reaped.
    pub fn run_tool(&self) -> Result<ToolProcess> {
        info!(target: LOG_TARGET, "Run tool");
        let command = self.command();
        info!(target: LOG_TARGET, "Executing command: {:?}", command);
        let mut proc = ToolProcess::spawn(&command)?;
        if self.one_shot {
            let t = proc.communicate(None, self.grace)?;
            self.log_streams(&proc);
            debug!(target: LOG_TARGET, "{}: one-shot run {}", self.name, t.diagnostic());
        }
        Ok(proc)
    }

    pub fn is_stop_tool(&self, proc: &mut ToolProcess) -> Result<bool> {
        Ok(proc.poll()?.is_some())
    }

    /// Sends the configured argument line to an interactive tool.
    ///
    /// With a dds peer the tool is then given the grace window to finish and
    /// its exit code is validated; `None` means it is still running.
    pub fn send_command_tool(&self, proc: &mut ToolProcess) -> Result<Option<bool>> {
        info!(target: LOG_TARGET, "Send command <{}>", self.arguments);
        // The payload is the configured argument, never a fixed placeholder.
        if !proc.write_line(&self.arguments)? {
            warn!(target: LOG_TARGET, "{}: tool closed its input before the command was sent", self.name);
        }
        if !self.dds {
            return Ok(None);
        }
        match proc.wait_with_deadline(self.grace) {
            Ok(t) => {
                self.log_streams(proc);
                Ok(Some(self.valid_output_tool(t.return_code())))
            }
            Err(RunnerError::TimedOut(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Asks the tool to exit and reaps it, killing it if the grace window runs out.
    pub fn stop_tool(&self, proc: &mut ToolProcess) -> Result<Termination> {
        info!(target: LOG_TARGET, "Stop tool");
        let t = proc.communicate(Some(EXIT_COMMAND), self.grace)?;
        self.log_streams(proc);
        Ok(t)
    }

    pub fn run_dds(&mut self) -> Result<()> {
        info!(target: LOG_TARGET, "Run dds");
        if self.peer_handle.is_some() {
            return Ok(());
        }
        self.peer_handle = Some(self.peer.start_peer()?);
        Ok(())
    }

    pub fn stop_dds(&mut self) -> Result<Option<Termination>> {
        let Some(handle) = self.peer_handle.take() else {
            return Ok(None);
        };
        info!(target: LOG_TARGET, "Stop dds peer {}", handle.label());
        self.peer.stop_peer(handle)
    }

    pub fn valid_output_tool(&self, returncode: i32) -> bool {
        valid_output_tool(returncode)
    }

    fn log_streams(&self, proc: &ToolProcess) {
        let out = proc.stdout();
        let err = proc.stderr();
        if !out.is_empty() {
            debug!(target: LOG_TARGET, "{} stdout:\n{}", self.name, out.trim_end());
        }
        if !err.is_empty() {
            debug!(target: LOG_TARGET, "{} stderr:\n{}", self.name, err.trim_end());
        }
    }
}

impl Drop for TestCase {
    fn drop(&mut self) {
        if let Some(handle) = self.peer_handle.take() {
            let _ = self.peer.stop_peer(handle);
        }
    }
}
