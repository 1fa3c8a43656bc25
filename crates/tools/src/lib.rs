// # -----------------------------
// # crates/tools/src/lib.rs
// # -----------------------------
// Lifecycle of the tool under test: spawn, drive over stdin, stop, classify.

pub mod case;
pub mod error;
pub mod exit;
pub mod peer;
pub mod process;

pub use case::{build_argv, TestCase, EXIT_COMMAND};
pub use error::{Result, RunnerError};
pub use exit::{valid_output_tool, ChildState, ExitClass, Termination};
pub use peer::{CommandPeer, NoopPeer, PeerHandle, PeerLauncher};
pub use process::ToolProcess;
