//! Command-line surface.
//!
//! One flat option set (no subcommands) — grounded in the teacher's
//! `#[derive(Parser)]`/`trailing_var_arg` usage, but restated without a
//! `Subcommand` split: this binary has exactly one mode (supervise) plus a
//! lightweight "send one command and exit" mode selected by `--command`,
//! not enough distinct surfaces to warrant subcommands.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "supervisord-mini",
    version,
    about = "Run a child program under a PTY, restart it with backoff, and steer it via a command FIFO"
)]
pub struct Cli {
    /// Detach from the controlling terminal and run as a background service
    #[arg(long, short = 'd')]
    pub daemon: bool,

    /// Empty the child's environment before applying --env
    #[arg(long, short = 'C')]
    pub clear_env: bool,

    /// Set (VAR=VAL) or unset (VAR) an environment variable in the child;
    /// may be given multiple times
    #[arg(long = "env", short = 'E')]
    pub env: Vec<String>,

    /// Reserved for future notification support; accepted, never acted on
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Log identifier used for lines captured from the child's output
    #[arg(long = "child-log-name", short = 'L')]
    pub child_log_name: Option<String>,

    /// Log identifier used for the supervisor's own messages
    #[arg(long = "log-name", short = 'l')]
    pub log_name: Option<String>,

    /// Upper bound on the restart backoff, in seconds
    #[arg(long = "max-wait-time", short = 'M')]
    pub max_wait_time: Option<u32>,

    /// Lower bound (and initial value) of the restart backoff, in seconds
    #[arg(long = "min-wait-time", short = 'm')]
    pub min_wait_time: Option<u32>,

    /// Write the supervisor's pid here; unlinked on every normal exit
    #[arg(long = "pid-file", short = 'p')]
    pub pid_file: Option<PathBuf>,

    /// Change the child's working directory before exec
    #[arg(long = "dir", short = 'D')]
    pub dir: Option<PathBuf>,

    /// Shell script run in the child, before exec, after env/uid/gid/chdir
    #[arg(long = "startup-script", short = 'S')]
    pub startup_script: Option<PathBuf>,

    /// Drop privileges in the child: "user", "user:group", or ":group"
    #[arg(long = "user", short = 'u')]
    pub user: Option<String>,

    /// Path of the named pipe used for out-of-band commands
    #[arg(long = "command-pipe", short = 'P')]
    pub command_pipe: Option<PathBuf>,

    /// Send a single command to an already-running instance, then exit
    #[arg(long, short = 'c', value_enum)]
    pub command: Option<CommandWord>,

    /// Close every file descriptor >= 3 before any pipes are created
    #[arg(long = "release-allfd", short = 'z')]
    pub release_allfd: bool,

    /// Target program and its arguments (prefix with `--` if they start
    /// with a dash)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub program: Vec<String>,
}

/// The FIFO command alphabet, named for `--command`/`clap::ValueEnum`
/// purposes — the wire form is still the single byte from §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum CommandWord {
    Start,
    Stop,
    Exit,
    Hup,
    Int,
}

impl CommandWord {
    pub fn wire_byte(self) -> u8 {
        match self {
            CommandWord::Start => b'+',
            CommandWord::Stop => b'-',
            CommandWord::Hup => b'h',
            CommandWord::Int => b'i',
            CommandWord::Exit => b'x',
        }
    }
}
