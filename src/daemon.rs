//! Detaching from the controlling terminal.
//!
//! Restates `go_daemon()`: fork, parent exits immediately, child `setsid`s
//! and redirects fds 0-2 to `/dev/null`. No readiness pipe back to the
//! parent — unlike the `avinassh-agentfs` daemonize helper this guards
//! against, `go_daemon()`'s parent doesn't wait for anything, it just exits,
//! and this mirrors that.

use nix::unistd::{ForkResult, fork, setsid};

use crate::error::SetupError;

/// Forks and exits the parent. Only the child returns. Matches
/// `go_daemon()`'s "parent: exit(0)" branch — callers that need a nonzero
/// exit on fork failure before any logging exists should print to stderr
/// themselves; this just propagates the error.
///
/// # Safety
/// Must be called before any other threads exist and before any fds this
/// process cares about are shared in a way that would be unsafe to inherit
/// across `fork`.
pub unsafe fn daemonize() -> Result<(), SetupError> {
    match unsafe { fork() }.map_err(SetupError::Fork)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(SetupError::Setsid)?;
    redirect_std_fds_to_devnull()?;
    Ok(())
}

/// Uses raw `libc::open`/`dup2` rather than `nix`'s wrappers — like the
/// teacher's child branch, this runs right after `fork`, where sticking to
/// a minimal, well-understood set of calls matters more than ergonomics.
fn redirect_std_fds_to_devnull() -> Result<(), SetupError> {
    let devnull = unsafe { libc::open(c"/dev/null".as_ptr(), libc::O_RDWR) };
    if devnull < 0 {
        return Err(SetupError::Io(std::io::Error::last_os_error()));
    }
    for target in [0, 1, 2] {
        if unsafe { libc::dup2(devnull, target) } < 0 {
            return Err(SetupError::Io(std::io::Error::last_os_error()));
        }
    }
    if devnull > 2 {
        unsafe { libc::close(devnull) };
    }
    Ok(())
}

/// Closes every fd >= 3, for `--release-allfd`. Grounded on the spec's own
/// note that a supervisor inherited from an unknown parent may hold fds it
/// has no business keeping; `sysconf(_SC_OPEN_MAX)` gives the limit `nix`
/// does not expose directly.
pub fn release_all_fds() {
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max = if max > 0 { max as i32 } else { 1024 };
    for fd in 3..max {
        // SAFETY: closing an fd we don't own is a documented no-op error
        // (EBADF), not unsound; we only ever observe the return value.
        let _ = unsafe { libc::close(fd) };
    }
}
