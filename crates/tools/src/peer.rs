//! Companion DDS peer started before the tool under test.
//!
//! The tool needs something on the network to introspect. A [`PeerLauncher`]
//! starts that process and stops it once the case is over; [`NoopPeer`] is
//! used when no peer command is configured.

use crate::error::{Result, RunnerError};
use crate::exit::Termination;
use crate::process::try_wait_until;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use systest_common::LOG_TARGET;
use tracing::{debug, info, warn};

pub trait PeerLauncher: Send {
    fn start_peer(&mut self) -> Result<PeerHandle>;

    /// Returns how the peer ended, `None` when there was no process to stop.
    fn stop_peer(&mut self, handle: PeerHandle) -> Result<Option<Termination>>;
}

pub struct PeerHandle {
    label: String,
    child: Option<Child>,
}

impl PeerHandle {
    /// Handle that owns no process.
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            child: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("label", &self.label)
            .field("pid", &self.id())
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPeer;

impl PeerLauncher for NoopPeer {
    fn start_peer(&mut self) -> Result<PeerHandle> {
        debug!(target: LOG_TARGET, "no dds peer configured");
        Ok(PeerHandle::detached("noop"))
    }

    fn stop_peer(&mut self, _handle: PeerHandle) -> Result<Option<Termination>> {
        Ok(None)
    }
}

/// Runs an external publisher/subscriber for the duration of a case.
#[derive(Debug, Clone)]
pub struct CommandPeer {
    argv: Vec<OsString>,
    grace: Duration,
}

impl CommandPeer {
    pub fn new<I, S>(argv: I, grace: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let Some(program) = argv.first_mut() else {
            return Err(RunnerError::Peer("empty peer command".into()));
        };
        if let Ok(found) = which::which(&*program) {
            *program = found.into_os_string();
        }
        Ok(Self { argv, grace })
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }
}

impl PeerLauncher for CommandPeer {
    fn start_peer(&mut self) -> Result<PeerHandle> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| RunnerError::Peer("empty peer command".into()))?;
        let label = program.to_string_lossy().into_owned();
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: label.clone(),
                source,
            })?;
        info!(target: LOG_TARGET, "Run dds peer {label} (pid {})", child.id());
        Ok(PeerHandle {
            label,
            child: Some(child),
        })
    }

    fn stop_peer(&mut self, handle: PeerHandle) -> Result<Option<Termination>> {
        let PeerHandle { label, child } = handle;
        let Some(mut child) = child else {
            return Ok(None);
        };
        if let Some(status) = child.try_wait()? {
            warn!(target: LOG_TARGET, "dds peer {label} was already gone ({status})");
            return Ok(Some(Termination::from_status(status, false)));
        }
        interrupt(&child)?;
        let deadline = Instant::now() + self.grace;
        if let Some(status) = try_wait_until(&mut child, deadline)? {
            debug!(target: LOG_TARGET, "dds peer {label} stopped ({status})");
            return Ok(Some(Termination::from_status(status, false)));
        }
        warn!(target: LOG_TARGET, "dds peer {label} ignored interrupt, killing it");
        match child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        let status = child.wait()?;
        Ok(Some(Termination::from_status(status, true)))
    }
}

#[cfg(unix)]
fn interrupt(child: &Child) -> io::Result<()> {
    // SAFETY: the pid belongs to a child we have not reaped yet.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn noop_peer_has_nothing_to_stop() {
        let mut peer = NoopPeer;
        let handle = peer.start_peer().unwrap();
        assert_eq!(handle.id(), None);
        assert_eq!(peer.stop_peer(handle).unwrap(), None);
    }

    #[test]
    fn empty_command_rejected() {
        let err = CommandPeer::new(Vec::<String>::new(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, RunnerError::Peer(_)));
    }

    #[test]
    fn peer_stops_on_interrupt() {
        let mut peer = CommandPeer::new(["sleep", "30"], Duration::from_secs(5)).unwrap();
        let handle = peer.start_peer().unwrap();
        assert!(handle.id().is_some());
        let t = peer.stop_peer(handle).unwrap().unwrap();
        assert_eq!(t, Termination::Killed { signal: libc::SIGINT, forced: false });
    }

    #[test]
    fn stubborn_peer_is_killed() {
        let mut peer = CommandPeer::new(
            ["sh", "-c", "trap '' INT; while :; do sleep 0.05; done"],
            Duration::from_millis(300),
        )
        .unwrap();
        let handle = peer.start_peer().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let t = peer.stop_peer(handle).unwrap().unwrap();
        assert!(t.was_forced());
        assert_eq!(t.return_code(), -9);
    }

    #[test]
    fn missing_peer_is_spawn_error() {
        let mut peer = CommandPeer::new(["/no/such/dds-peer"], Duration::from_secs(1)).unwrap();
        assert!(matches!(peer.start_peer(), Err(RunnerError::Spawn { .. })));
    }
}
