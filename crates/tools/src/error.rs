use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The executable could not be started at all (missing, not executable, ...).
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("process did not exit within {0:?}")]
    TimedOut(Duration),
    #[error("child {0} pipe missing")]
    MissingPipe(&'static str),
    #[error("peer: {0}")]
    Peer(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;
