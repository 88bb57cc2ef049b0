//! Error taxonomy and exit-code mapping.
//!
//! Mirrors `pty::PtyError` from the teacher: one `thiserror` enum per
//! failure class, seamed at the points the spec actually distinguishes
//! (configuration vs. setup vs. allocation), rather than one flat enum.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced before any logging infrastructure exists — printed to
/// stderr and fatal with exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Usage(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("unknown group: {0}")]
    UnknownGroup(String),
    #[error("invalid --env value {0:?}: a leading '=' is not allowed")]
    LeadingEquals(String),
    #[error("--env value {0:?} contains a NUL byte")]
    NulByte(String),
    #[error("command-pipe path {0:?} exists and is not a FIFO")]
    NotAFifo(PathBuf),
}

/// System-call failures during setup (pipe/FIFO/fork/setsid/pid file).
/// Fatal, exit code 2.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("pipe() failed: {0}")]
    Pipe(#[source] nix::Error),
    #[error("mkfifo() failed: {0}")]
    Fifo(#[source] nix::Error),
    #[error("fork() failed: {0}")]
    Fork(#[source] nix::Error),
    #[error("setsid() failed: {0}")]
    Setsid(#[source] nix::Error),
    #[error("openpty() failed: {0}")]
    Pty(#[source] nix::Error),
    #[error("signal setup failed: {0}")]
    Signal(#[source] nix::Error),
    #[error("failed to open pid file {0:?}: {1}")]
    PidFile(PathBuf, #[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Allocation failure while assembling the child's argv/env vectors.
/// Fatal, exit code 5.
#[derive(Debug, Error)]
#[error("allocation failed while preparing the child process")]
pub struct AllocError;

/// Top-level error returned by configuration/startup, carrying enough
/// information to pick the right exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) => 1,
            StartupError::Setup(_) => 2,
            StartupError::Alloc(_) => 5,
        }
    }
}

/// The sentinel exit status a child uses when it fails before (or instead
/// of) `exec`ing the target program — recognized by the parent to suppress
/// a redundant log line.
pub const EXIT_CHILD_EXEC_FAILURE: i32 = 99;
