//! Assembles a validated [`SupervisorConfig`] from parsed CLI arguments.
//!
//! Grounded on `get_user_and_group_names`/the `-u`/`-M`/`-m` handling in
//! `process-monitor.c`: user/group lookup falls back to numeric id, and a
//! `max-wait < min-wait` is corrected rather than rejected.

use std::path::PathBuf;

use nix::unistd::{Gid, Uid};

use crate::cli::Cli;
use crate::envlist::{self, EnvOp};
use crate::error::ConfigError;

const DEFAULT_MIN_WAIT: u32 = 2;
const DEFAULT_MAX_WAIT: u32 = 300;
const DEFAULT_COMMAND_PIPE: &str = "/var/run/supervisord-mini.cmd";

/// uid/gid to switch the child to after fork, resolved ahead of time so the
/// async-signal-safe child branch only ever calls `setgid`/`setuid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Option<Uid>,
    pub gid: Option<Gid>,
}

#[derive(Debug, Clone)]
pub struct ChildConfig {
    pub program: Vec<String>,
    pub dir: Option<PathBuf>,
    pub startup_script: Option<PathBuf>,
    pub clear_env: bool,
    pub env_ops: Vec<EnvOp>,
    pub credentials: Credentials,
    pub log_name: String,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub daemon: bool,
    pub min_wait: u32,
    pub max_wait: u32,
    pub pid_file: Option<PathBuf>,
    pub command_pipe: PathBuf,
    pub release_allfd: bool,
    pub log_name: String,
    pub child: ChildConfig,
    /// Non-fatal adjustments made while validating, logged once the logger
    /// is up (e.g. "max wait time set to N seconds").
    pub warnings: Vec<String>,
}

/// A one-shot request to poke a running instance's FIFO instead of
/// supervising a child ourselves.
#[derive(Debug, Clone)]
pub struct SendCommand {
    pub command_pipe: PathBuf,
    pub byte: u8,
}

pub enum Invocation {
    Supervise(Box<SupervisorConfig>),
    Send(SendCommand),
}

/// Resolves a user name or decimal uid string, mirroring
/// `get_user_and_group_names`'s getpwnam-then-strtol fallback. Parses as
/// `i64` first so a negative value is rejected before ever being cast to
/// the unsigned `uid_t`/`gid_t` domain.
fn resolve_uid(name: &str) -> Result<Uid, ConfigError> {
    if let Some(user) = nix::unistd::User::from_name(name).ok().flatten() {
        return Ok(user.uid);
    }
    match name.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(Uid::from_raw(n as u32)),
        _ => Err(ConfigError::UnknownUser(name.to_string())),
    }
}

fn resolve_gid(name: &str) -> Result<Gid, ConfigError> {
    if let Some(group) = nix::unistd::Group::from_name(name).ok().flatten() {
        return Ok(group.gid);
    }
    match name.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(Gid::from_raw(n as u32)),
        _ => Err(ConfigError::UnknownGroup(name.to_string())),
    }
}

/// Splits `user[:group]` / `:group` the way `get_user_and_group_names` does:
/// a leading colon names a group with no user, a colon elsewhere separates
/// user from group, no colon means user only.
fn resolve_credentials(spec: &str) -> Result<Credentials, ConfigError> {
    let (user_part, group_part) = match spec.find(':') {
        None => (Some(spec), None),
        Some(0) => (None, Some(&spec[1..])),
        Some(pos) => (Some(&spec[..pos]), Some(&spec[pos + 1..])),
    };
    let uid = user_part.map(resolve_uid).transpose()?;
    let gid = group_part.map(resolve_gid).transpose()?;
    Ok(Credentials { uid, gid })
}

fn derive_log_name(program: &[String]) -> String {
    let first = program.first().map(String::as_str).unwrap_or("child");
    first.rsplit('/').next().unwrap_or(first).to_string()
}

pub fn build(cli: Cli) -> Result<Invocation, ConfigError> {
    let command_pipe = cli
        .command_pipe
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COMMAND_PIPE));

    if let Some(word) = cli.command {
        return Ok(Invocation::Send(SendCommand {
            command_pipe,
            byte: word.wire_byte(),
        }));
    }

    if cli.program.is_empty() {
        return Err(ConfigError::Usage("need a program to run".to_string()));
    }

    let env_ops = envlist::parse_env_args(&cli.env)?;

    let credentials = match &cli.user {
        Some(spec) => resolve_credentials(spec)?,
        None => Credentials { uid: None, gid: None },
    };

    let mut warnings = Vec::new();
    let min_wait = cli.min_wait_time.unwrap_or(DEFAULT_MIN_WAIT);
    let mut max_wait = cli.max_wait_time.unwrap_or(DEFAULT_MAX_WAIT);
    if max_wait < min_wait {
        max_wait = min_wait;
        warnings.push(format!("max wait time set to {max_wait} seconds"));
    }

    let child_log_name = cli
        .child_log_name
        .clone()
        .unwrap_or_else(|| derive_log_name(&cli.program));
    let log_name = cli.log_name.clone().unwrap_or_else(|| "supervisord-mini".to_string());

    let child = ChildConfig {
        program: cli.program,
        dir: cli.dir,
        startup_script: cli.startup_script,
        clear_env: cli.clear_env,
        env_ops,
        credentials,
        log_name: child_log_name,
    };

    Ok(Invocation::Supervise(Box::new(SupervisorConfig {
        daemon: cli.daemon,
        min_wait,
        max_wait,
        pid_file: cli.pid_file,
        command_pipe,
        release_allfd: cli.release_allfd,
        log_name,
        child,
        warnings,
    })))
}
