//! Child process handle with background stream drains.
//!
//! Waiting is split into two phases: [`ToolProcess::wait_with_deadline`]
//! gives the child a grace window, and only after that window elapsed does
//! the caller [`ToolProcess::force_kill`] it and [`ToolProcess::wait_unbounded`].
//! The second phase never carries a timeout.

use crate::error::{Result, RunnerError};
use crate::exit::{ChildState, Termination};
use std::borrow::Cow;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use systest_common::LOG_TARGET;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Polls `child` until it exits or `deadline` passes (`Ok(None)`).
pub(crate) fn try_wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Reads one pipe to EOF on its own thread so the child never blocks on a
/// full pipe while the caller is busy.
struct StreamDrain {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    bytes: Option<Vec<u8>>,
}

impl StreamDrain {
    fn start<R: Read + Send + 'static>(mut reader: R) -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        thread::spawn(move || {
            let mut buf = Vec::new();
            let res = reader.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(res);
        });
        Self { rx, bytes: None }
    }

    /// `Ok(false)` means the stream was still open when `timeout` elapsed.
    fn collect(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.bytes.is_some() {
            return Ok(true);
        }
        let res = match timeout {
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(res) => res,
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(false),
                Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Vec::new()),
            },
            None => self.rx.recv().unwrap_or_else(|_| Ok(Vec::new())),
        };
        self.bytes = Some(res?);
        Ok(true)
    }

    fn bytes(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or_default()
    }
}

pub struct ToolProcess {
    child: Child,
    argv: Vec<OsString>,
    stdin: Option<ChildStdin>,
    stdout: StreamDrain,
    stderr: StreamDrain,
    state: ChildState,
    killed: bool,
}

impl ToolProcess {
    /// Spawns `argv` with all three standard streams piped.
    pub fn spawn(argv: &[OsString]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RunnerError::Spawn {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty argv"),
            });
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.to_string_lossy().into_owned(),
                source,
            })?;
        let stdin = child.stdin.take();
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(o), Some(e)) => (StreamDrain::start(o), StreamDrain::start(e)),
            (o, _) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunnerError::MissingPipe(if o.is_none() { "stdout" } else { "stderr" }));
            }
        };
        debug!(target: LOG_TARGET, "spawned pid {}: {:?}", child.id(), argv);
        Ok(Self {
            child,
            argv: argv.to_vec(),
            stdin,
            stdout,
            stderr,
            state: ChildState::Running,
            killed: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    pub fn termination(&self) -> Option<Termination> {
        self.state.termination()
    }

    /// Non-blocking check; once an exit is observed it is remembered.
    pub fn poll(&mut self) -> Result<Option<Termination>> {
        if let Some(t) = self.state.termination() {
            return Ok(Some(t));
        }
        Ok(self.child.try_wait()?.map(|status| self.record(status)))
    }

    fn record(&mut self, status: ExitStatus) -> Termination {
        let t = Termination::from_status(status, self.killed);
        self.state = ChildState::Terminated(t);
        t
    }

    /// Writes `line` plus a newline to the child's stdin.
    ///
    /// Returns `Ok(false)` when the child no longer reads its input.
    pub fn write_line(&mut self, line: &str) -> Result<bool> {
        self.write_bytes(format!("{line}\n").as_bytes())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<bool> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(false);
        };
        match stdin.write_all(bytes).and_then(|_| stdin.flush()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(target: LOG_TARGET, "stdin closed by child {}", self.child.id());
                self.stdin = None;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    /// Waits for exit and for both streams to close, up to `grace`.
    pub fn wait_with_deadline(&mut self, grace: Duration) -> Result<Termination> {
        let deadline = Instant::now() + grace;
        let termination = match self.state.termination() {
            Some(t) => t,
            None => match try_wait_until(&mut self.child, deadline)? {
                Some(status) => self.record(status),
                None => return Err(RunnerError::TimedOut(grace)),
            },
        };
        for drain in [&mut self.stdout, &mut self.stderr] {
            let left = deadline.saturating_duration_since(Instant::now());
            if !drain.collect(Some(left))? {
                return Err(RunnerError::TimedOut(grace));
            }
        }
        Ok(termination)
    }

    pub fn force_kill(&mut self) -> Result<()> {
        if self.state.termination().is_some() {
            return Ok(());
        }
        self.killed = true;
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already reaped between the last poll and now.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocks until the child has exited and both streams are closed.
    pub fn wait_unbounded(&mut self) -> Result<Termination> {
        let termination = match self.state.termination() {
            Some(t) => t,
            None => {
                let status = self.child.wait()?;
                self.record(status)
            }
        };
        self.stdin = None;
        self.stdout.collect(None)?;
        self.stderr.collect(None)?;
        Ok(termination)
    }

    /// Grace-window wait, falling back to kill plus unbounded wait.
    pub fn wait_or_kill(&mut self, grace: Duration) -> Result<Termination> {
        match self.wait_with_deadline(grace) {
            Err(RunnerError::TimedOut(after)) => {
                let pid = self.child.id();
                if self.state.termination().is_some() {
                    // Exited, but a descendant still holds stdout or stderr.
                    warn!(
                        target: LOG_TARGET,
                        "process {pid} exited but its streams are still open after {after:?}, waiting for them"
                    );
                } else {
                    warn!(target: LOG_TARGET, "process {pid} still running after {after:?}, killing it");
                }
                self.force_kill()?;
                self.wait_unbounded()
            }
            other => other,
        }
    }

    /// Sends `input` (if any), closes stdin and waits like [`Self::wait_or_kill`].
    pub fn communicate(&mut self, input: Option<&[u8]>, grace: Duration) -> Result<Termination> {
        if let Some(bytes) = input {
            self.write_bytes(bytes)?;
        }
        self.close_stdin();
        self.wait_or_kill(grace)
    }

    pub fn stdout(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.stdout.bytes())
    }

    pub fn stderr(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.stderr.bytes())
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if self.state.termination().is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
