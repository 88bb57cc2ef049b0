//! Child process spawning — PTY allocation, fork, exec.
//!
//! Grounded on the teacher's `pty::child::spawn_child` (CString pre-fork
//! validation, `openpty`, fork, async-signal-safe-only child branch,
//! `dup2` onto 0/1/2, close-all-other-fds), extended with the env/uid/gid/
//! chdir/startup-hook steps from `process-monitor.c`'s `start_child()` and
//! spec §4.3.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::libc;
use nix::pty::{Winsize, openpty};
use nix::unistd::{ForkResult, Pid, fork, setsid};

use crate::config::ChildConfig;
use crate::envlist;
use crate::error::SetupError;

/// A spawned child process with its PTY master fd.
#[derive(Debug)]
pub struct ChildProcess {
    pub pid: Pid,
    pub master: OwnedFd,
}

/// Default window size used when allocating the PTY — this supervisor has
/// no controlling terminal of its own to copy dimensions from.
pub fn default_winsize() -> Winsize {
    Winsize { ws_row: 24, ws_col: 80, ws_xpixel: 0, ws_ypixel: 0 }
}

/// Spawns the configured child program on a fresh PTY.
///
/// `inherited_fds` are the supervisor's self-pipe and command-FIFO
/// descriptors; the spec requires the child branch to close these before
/// exec (§4.3) so a child that lives on cannot interfere with them.
///
/// # Safety
/// Uses `fork()` internally. Only async-signal-safe operations run in the
/// child branch between fork and exec/_exit.
pub unsafe fn spawn(cfg: &ChildConfig, inherited_fds: &[RawFd]) -> Result<ChildProcess, SetupError> {
    if cfg.program.is_empty() {
        return Err(SetupError::Io(std::io::Error::other("empty command")));
    }

    let c_args: Vec<CString> = cfg
        .program
        .iter()
        .map(|s| CString::new(s.as_bytes()).map_err(|_| SetupError::Io(std::io::Error::other("argument contains null byte"))))
        .collect::<Result<Vec<_>, _>>()?;
    let program_path = c_args[0].clone();
    let startup_script = cfg
        .startup_script
        .as_ref()
        .map(|p| CString::new(p.as_os_str().as_encoded_bytes()))
        .transpose()
        .map_err(|_| SetupError::Io(std::io::Error::other("startup script path contains null byte")))?;
    let dir = cfg
        .dir
        .as_ref()
        .map(|p| CString::new(p.as_os_str().as_encoded_bytes()))
        .transpose()
        .map_err(|_| SetupError::Io(std::io::Error::other("working directory contains null byte")))?;

    let winsize = default_winsize();
    let pty = openpty(Some(&winsize), None).map_err(SetupError::Pty)?;
    let master = pty.master;
    let slave = pty.slave;
    nix::fcntl::fcntl(&master, nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK))
        .map_err(SetupError::Pty)?;

    let inherited_fds = inherited_fds.to_vec();

    match unsafe { fork() }.map_err(SetupError::Fork)? {
        ForkResult::Parent { child } => {
            drop(slave);
            Ok(ChildProcess { pid: child, master })
        }
        ForkResult::Child => {
            // -- async-signal-safe only from here to exec/_exit --
            drop(master);
            for fd in &inherited_fds {
                unsafe { libc::close(*fd) };
            }

            if setsid().is_err() {
                unsafe { libc::_exit(99) };
            }
            let slave_fd = slave.as_raw_fd();
            if unsafe { libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) } < 0 {
                unsafe { libc::_exit(99) };
            }
            if unsafe { libc::dup2(slave_fd, 0) } < 0
                || unsafe { libc::dup2(slave_fd, 1) } < 0
                || unsafe { libc::dup2(slave_fd, 2) } < 0
            {
                unsafe { libc::_exit(99) };
            }
            if slave_fd > 2 {
                drop(slave);
            } else {
                std::mem::forget(slave);
            }
            for fd in 3..1024 {
                unsafe { libc::close(fd) };
            }

            unsafe { envlist::apply(cfg.clear_env, &cfg.env_ops) };

            if let Some(gid) = cfg.credentials.gid {
                if unsafe { libc::setgid(gid.as_raw()) } != 0 {
                    unsafe { libc::_exit(99) };
                }
            }
            if let Some(uid) = cfg.credentials.uid {
                if unsafe { libc::setuid(uid.as_raw()) } != 0 {
                    unsafe { libc::_exit(99) };
                }
            }

            if let Some(dir) = &dir {
                if unsafe { libc::chdir(dir.as_ptr()) } != 0 {
                    unsafe { libc::_exit(99) };
                }
            }

            if let Some(script) = &startup_script {
                if !run_startup_hook(script) {
                    unsafe { libc::_exit(99) };
                }
            }

            unsafe { libc::execv(program_path.as_ptr(), build_argv(&c_args).as_ptr()) };
            unsafe { libc::_exit(99) };
        }
    }
}

/// Runs the startup hook via the shell, the way a "shell startup hook"
/// reads: returns `false` only when the hook was killed by `SIGINT` or
/// `SIGQUIT`, per spec §4.3 — any other nonzero exit is tolerated.
fn run_startup_hook(script: &CString) -> bool {
    let status = unsafe { libc::system(script.as_ptr()) };
    if status == -1 {
        return false;
    }
    if libc::WIFSIGNALED(status) {
        let sig = libc::WTERMSIG(status);
        return sig != libc::SIGINT && sig != libc::SIGQUIT;
    }
    true
}

fn build_argv(args: &[CString]) -> Vec<*const libc::c_char> {
    let mut argv: Vec<*const libc::c_char> = args.iter().map(|a| a.as_ptr()).collect();
    argv.push(std::ptr::null());
    argv
}

pub mod reap;
