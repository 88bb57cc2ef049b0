//! Non-blocking child reaping.
//!
//! Restates `handle_child_signal()`'s `waitpid(-1, &status, WNOHANG)` plus
//! its `WIFSIGNALED`/`WEXITSTATUS` classification (including the
//! exit-99-suppression rule for the exec-failure sentinel), grounded on
//! the teacher's `wait_for_exit` for the `nix::sys::wait` idiom, made
//! non-blocking rather than looped-with-sleep.

use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::error::EXIT_CHILD_EXEC_FAILURE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClassification {
    /// Exited normally; `status != 99` (99 means exec failed and was
    /// already logged by the child, so the parent should stay quiet).
    Exited(i32),
    /// Exited with the exec-failure sentinel; nothing further to log.
    ExecFailureSentinel,
    Signaled(i32),
}

impl ExitClassification {
    pub fn should_log(self) -> bool {
        !matches!(self, ExitClassification::ExecFailureSentinel)
    }
}

fn classify(status: i32, signaled: bool) -> ExitClassification {
    if signaled {
        ExitClassification::Signaled(status)
    } else if status == EXIT_CHILD_EXEC_FAILURE {
        ExitClassification::ExecFailureSentinel
    } else {
        ExitClassification::Exited(status)
    }
}

/// The backoff arithmetic from spec §4.3/§8: doubles on every death,
/// saturating at `max_wait`. Pulled out as a pure function, separate from
/// `Supervisor`'s `&mut self` bookkeeping, so it can be property-tested
/// against §8 invariants 3/4 without spawning any real process.
pub fn next_wait_time(current: u32, max_wait: u32) -> u32 {
    current.saturating_mul(2).min(max_wait)
}

/// Resets the backoff to its floor — what an explicit "resume monitoring"
/// command does (spec §4.2 USR2, §4.3 "Backoff").
pub fn reset_wait_time(min_wait: u32) -> u32 {
    min_wait
}

/// Reaps any exited child without blocking. Returns `None` if no tracked
/// child has exited, or if `pid` doesn't match what just got reaped (the
/// original silently ignores this case too, since another already-reaped
/// grandchild could in principle show up here).
pub fn reap_if_matches(pid: Pid) -> Option<ExitClassification> {
    match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(reaped, code)) if reaped == pid => {
            Some(classify(code, false))
        }
        Ok(WaitStatus::Signaled(reaped, sig, _)) if reaped == pid => {
            Some(classify(sig as i32, true))
        }
        _ => None,
    }
}
