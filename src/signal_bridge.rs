//! The self-pipe trick.
//!
//! `process-monitor.c`'s `signal_handler()`/`signal_command_pipe` turned
//! async signal delivery into synchronous, `select()`-able bytes; this is
//! the same idea with `nix::sys::signal::sigaction` in place of raw
//! `sigaction(2)` and atomics for the signal-handler-to-struct link, the
//! way `examples/other_examples/…nix_signal_handler.rs.rs` uses
//! `AtomicI32`/`AtomicBool` to cross that boundary safely.

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::{pipe, read, write};

use crate::error::SetupError;

/// One token per signal the original dispatches on, named after the byte
/// it used to write (`A`/`C`/`H`/`I`/`T`/`1`/`2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalToken {
    Alarm,
    Child,
    Hup,
    Int,
    Term,
    Usr1,
    Usr2,
}

impl SignalToken {
    fn byte(self) -> u8 {
        match self {
            SignalToken::Alarm => b'A',
            SignalToken::Child => b'C',
            SignalToken::Hup => b'H',
            SignalToken::Int => b'I',
            SignalToken::Term => b'T',
            SignalToken::Usr1 => b'1',
            SignalToken::Usr2 => b'2',
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'A' => Some(SignalToken::Alarm),
            b'C' => Some(SignalToken::Child),
            b'H' => Some(SignalToken::Hup),
            b'I' => Some(SignalToken::Int),
            b'T' => Some(SignalToken::Term),
            b'1' => Some(SignalToken::Usr1),
            b'2' => Some(SignalToken::Usr2),
            _ => None,
        }
    }

    fn from_signal(sig: Signal) -> Option<Self> {
        match sig {
            Signal::SIGALRM => Some(SignalToken::Alarm),
            Signal::SIGCHLD => Some(SignalToken::Child),
            Signal::SIGHUP => Some(SignalToken::Hup),
            Signal::SIGINT => Some(SignalToken::Int),
            Signal::SIGTERM => Some(SignalToken::Term),
            Signal::SIGUSR1 => Some(SignalToken::Usr1),
            Signal::SIGUSR2 => Some(SignalToken::Usr2),
            _ => None,
        }
    }
}

/// Write end of the currently-active pipe, shared with the signal handler.
/// -1 means "no pipe installed yet" — the handler silently drops the
/// signal in that case, which can only happen during the brief startup
/// window before [`SignalPipe::new`] runs.
static WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn handle_signal(signum: i32) {
    let Ok(sig) = Signal::try_from(signum) else {
        return;
    };
    let Some(token) = SignalToken::from_signal(sig) else {
        return;
    };
    let fd = WRITE_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    // SAFETY: fd is a valid, open pipe write-end for the lifetime of the
    // process (replaced, never closed, by `recreate`); `write` is
    // async-signal-safe.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let byte = [token.byte()];
    let _ = write(borrowed, &byte);
}

const HANDLED_SIGNALS: &[Signal] = &[
    Signal::SIGALRM,
    Signal::SIGCHLD,
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

/// Owns the self-pipe's two ends and installs/reinstalls the handlers that
/// feed it.
pub struct SignalPipe {
    read_fd: OwnedFd,
    write_fd: RawFd,
}

impl SignalPipe {
    /// Creates the pipe, makes the read end non-blocking, and publishes the
    /// write end to the signal handler. Does not install handlers — call
    /// [`install_handlers`](Self::install_handlers) once, afterward.
    pub fn new() -> Result<Self, SetupError> {
        let (read_fd, write_fd) = pipe().map_err(SetupError::Pipe)?;
        let flags = fcntl(&read_fd, FcntlArg::F_GETFL).map_err(SetupError::Pipe)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(&read_fd, FcntlArg::F_SETFL(flags)).map_err(SetupError::Pipe)?;

        let write_raw = write_fd.as_raw_fd();
        WRITE_FD.store(write_raw, Ordering::Relaxed);
        // Leak the write end's ownership into the static: it must outlive
        // every signal that could still fire, which in practice means the
        // life of the process.
        std::mem::forget(write_fd);

        Ok(SignalPipe {
            read_fd,
            write_fd: write_raw,
        })
    }

    /// Installs `handle_signal` for every signal in [`HANDLED_SIGNALS`],
    /// with `SA_NOCLDSTOP` set (we don't want a notification when a child
    /// merely stops, only when it exits), matching `set_signal_handlers()`.
    pub fn install_handlers(&self) -> Result<(), SetupError> {
        let action = SigAction::new(
            SigHandler::Handler(handle_signal),
            SaFlags::SA_NOCLDSTOP,
            SigSet::empty(),
        );
        for &sig in HANDLED_SIGNALS {
            // SAFETY: `handle_signal` only touches an atomic and calls the
            // async-signal-safe `write(2)`.
            unsafe { sigaction(sig, &action) }.map_err(SetupError::Signal)?;
        }
        Ok(())
    }

    /// Rebuilds the pipe in place, for when the read end observes EOF
    /// (shouldn't happen since we hold the write end ourselves, but
    /// `read_signal_command_pipe()` guards against it and so do we).
    pub fn recreate(&mut self) -> Result<(), SetupError> {
        *self = SignalPipe::new()?;
        Ok(())
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_fd.as_raw_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Drains every byte currently available, in order, stopping at
    /// `EWOULDBLOCK`. Unknown bytes are dropped (logged by the caller).
    pub fn drain(&mut self) -> Result<Vec<SignalToken>, SetupError> {
        let mut tokens = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            match read(&self.read_fd, &mut buf) {
                Ok(0) => {
                    tracing::warn!("read end of signal pipe closed, recreating");
                    self.recreate()?;
                    return Ok(tokens);
                }
                Ok(_) => {
                    if let Some(token) = SignalToken::from_byte(buf[0]) {
                        tokens.push(token);
                    } else {
                        tracing::warn!(byte = buf[0], "unknown signal pipe byte");
                    }
                }
                Err(nix::errno::Errno::EWOULDBLOCK) => return Ok(tokens),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot read from signal pipe");
                    return Ok(tokens);
                }
            }
        }
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        WRITE_FD.store(-1, Ordering::Relaxed);
        unsafe { libc::close(self.write_fd) };
    }
}
