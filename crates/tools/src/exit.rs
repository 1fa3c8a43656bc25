//! Exit-status bookkeeping for the tool under test.
//!
//! Return codes follow the shell convention: the exit code when the process
//! exited on its own, `-signal` when a signal ended it (`-9` for SIGKILL).

use std::fmt;
use std::process::ExitStatus;

/// Signal number the harness uses to force a stuck process down.
#[cfg(unix)]
pub const SIGKILL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
pub const SIGKILL: i32 = 9;

/// Terminal state of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    /// `forced` is set when the harness sent the signal after the grace window.
    Killed { signal: i32, forced: bool },
}

impl Termination {
    pub fn from_status(status: ExitStatus, forced: bool) -> Self {
        if let Some(code) = status.code() {
            return Termination::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Termination::Killed { signal, forced };
            }
        }
        // No code and no signal: only reachable when we killed it ourselves.
        Termination::Killed {
            signal: SIGKILL,
            forced,
        }
    }

    pub fn return_code(&self) -> i32 {
        match *self {
            Termination::Exited(code) => code,
            Termination::Killed { signal, .. } => -signal,
        }
    }

    pub fn is_killed(&self) -> bool {
        matches!(self, Termination::Killed { .. })
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, Termination::Killed { forced: true, .. })
    }

    pub fn class(&self) -> ExitClass {
        ExitClass::from_return_code(self.return_code())
    }

    /// Human readable reason, always naming which way the process ended.
    pub fn diagnostic(&self) -> String {
        match *self {
            Termination::Exited(0) => "exited successfully".to_string(),
            Termination::Exited(code) => {
                format!("exited with status {code} ({})", self.class())
            }
            Termination::Killed { signal, forced: true } => {
                format!("timed out and was killed (signal {signal})")
            }
            Termination::Killed { signal, forced: false } => {
                format!("was terminated by signal {signal} ({})", self.class())
            }
        }
    }
}

/// Lifecycle of the child: `NotStarted -> Running -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildState {
    #[default]
    NotStarted,
    Running,
    Terminated(Termination),
}

impl ChildState {
    pub fn termination(&self) -> Option<Termination> {
        match self {
            ChildState::Terminated(t) => Some(*t),
            _ => None,
        }
    }
}

/// Well-known return codes, used for log diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    GeneralError,
    BuiltinMisuse,
    CannotExecute,
    NotFound,
    InvalidExitArgument,
    Interrupted,
    OutOfRange,
    KilledBySigkill,
    Other(i32),
}

impl ExitClass {
    pub fn from_return_code(code: i32) -> Self {
        match code {
            0 => ExitClass::Success,
            1 => ExitClass::GeneralError,
            2 => ExitClass::BuiltinMisuse,
            126 => ExitClass::CannotExecute,
            127 => ExitClass::NotFound,
            128 => ExitClass::InvalidExitArgument,
            130 => ExitClass::Interrupted,
            255 => ExitClass::OutOfRange,
            c if c == -SIGKILL => ExitClass::KilledBySigkill,
            c => ExitClass::Other(c),
        }
    }
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitClass::Success => write!(f, "successful termination"),
            ExitClass::GeneralError => write!(f, "general error"),
            ExitClass::BuiltinMisuse => write!(f, "misuse of shell builtins"),
            ExitClass::CannotExecute => write!(f, "command invoked cannot execute"),
            ExitClass::NotFound => write!(f, "command not found"),
            ExitClass::InvalidExitArgument => write!(f, "invalid argument to exit"),
            ExitClass::Interrupted => write!(f, "terminated by Ctrl-C"),
            ExitClass::OutOfRange => write!(f, "exit status out of range"),
            ExitClass::KilledBySigkill => write!(f, "killed by SIGKILL"),
            ExitClass::Other(c) if *c < 0 => write!(f, "signal {}", -c),
            ExitClass::Other(_) => write!(f, "unrecognized status"),
        }
    }
}

/// A run is valid only when the tool returned exactly 0.
pub fn valid_output_tool(returncode: i32) -> bool {
    returncode == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_is_valid() {
        assert!(valid_output_tool(0));
        for rc in [1, 2, 126, 127, 128, 130, 255, -9] {
            assert!(!valid_output_tool(rc), "rc {rc} must be rejected");
        }
    }

    #[test]
    fn killed_is_negative_signal() {
        let t = Termination::Killed { signal: SIGKILL, forced: true };
        assert_eq!(t.return_code(), -9);
        assert_eq!(t.class(), ExitClass::KilledBySigkill);
        assert!(t.is_killed());
        assert!(!valid_output_tool(t.return_code()));
    }

    #[test]
    fn classes_match_shell_codes() {
        assert_eq!(ExitClass::from_return_code(0), ExitClass::Success);
        assert_eq!(ExitClass::from_return_code(127), ExitClass::NotFound);
        assert_eq!(ExitClass::from_return_code(130), ExitClass::Interrupted);
        assert_eq!(ExitClass::from_return_code(42), ExitClass::Other(42));
    }

    #[test]
    fn diagnostics_tell_kill_from_failure() {
        let killed = Termination::Killed { signal: 9, forced: true }.diagnostic();
        let failed = Termination::Exited(1).diagnostic();
        assert!(killed.contains("timed out and was killed"));
        assert!(failed.contains("exited with status 1"));
        assert!(failed.contains("general error"));
        let crashed = Termination::Killed { signal: 11, forced: false }.diagnostic();
        assert!(crashed.contains("signal 11"));
        assert!(!crashed.contains("timed out"));
    }

    #[test]
    fn child_state_defaults_to_not_started() {
        assert_eq!(ChildState::default(), ChildState::NotStarted);
        assert_eq!(ChildState::Running.termination(), None);
        let t = Termination::Exited(0);
        assert_eq!(ChildState::Terminated(t).termination(), Some(t));
    }
}
