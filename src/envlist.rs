//! Child environment edits.
//!
//! Restates `envlist.c`'s growable `char **env` pair (one list to `putenv`,
//! one to `unsetenv`) as a typed `Vec<EnvOp>`: each `--env` argument is
//! classified once, at argument-parsing time, by whether it contains `=`.

use crate::error::ConfigError;

/// A single requested edit to the child's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOp {
    Set(String, String),
    Unset(String),
}

/// Parses one `--env`/`-E` argument into an [`EnvOp`].
///
/// A leading `=` is rejected the way `add_env()` rejects it in the original
/// (`equals == envvar`): `=FOO` names no variable. Anything else containing
/// `=` is a `VAR=VAL` assignment; anything without `=` unsets `VAR`.
pub fn parse_env_arg(arg: &str) -> Result<EnvOp, ConfigError> {
    if arg.as_bytes().contains(&0) {
        return Err(ConfigError::NulByte(arg.to_string()));
    }
    match arg.find('=') {
        Some(0) => Err(ConfigError::LeadingEquals(arg.to_string())),
        Some(pos) => Ok(EnvOp::Set(arg[..pos].to_string(), arg[pos + 1..].to_string())),
        None => Ok(EnvOp::Unset(arg.to_string())),
    }
}

/// Parses every `--env` argument, in order, stopping at the first error.
pub fn parse_env_args(args: &[String]) -> Result<Vec<EnvOp>, ConfigError> {
    args.iter().map(|a| parse_env_arg(a)).collect()
}

/// Applies `clear_env` then every op, in order — mirrors `setup_env()`'s
/// clear-then-set-then-unset sequence. Only safe to call in the
/// single-threaded child branch between `fork` and `exec`.
///
/// # Safety
/// Must run before any other thread could observe or mutate the process
/// environment; satisfied here because it only ever runs in a freshly
/// forked, still single-threaded child.
pub unsafe fn apply(clear_env: bool, ops: &[EnvOp]) {
    if clear_env {
        for (key, _) in std::env::vars() {
            unsafe { std::env::remove_var(key) };
        }
    }
    for op in ops {
        match op {
            EnvOp::Set(k, v) => unsafe { std::env::set_var(k, v) },
            EnvOp::Unset(k) => unsafe { std::env::remove_var(k) },
        }
    }
}
