//! The named-pipe command channel (spec §4.5).
//!
//! Not present in `process-monitor.c` — that original has no command
//! channel at all, only signals — so this is built directly from the
//! spec's own description, following the teacher's habit
//! (`broker/connection.rs`) of keeping a live peer handle around so a
//! channel's read side never sees a spurious EOF: we hold our own write
//! descriptor open for exactly that reason.

use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::stat::{Mode, SFlag, stat};
use nix::unistd::{mkfifo, read};

use crate::error::{ConfigError, SetupError, StartupError};

/// The FIFO command alphabet (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Hup,
    Int,
    Exit,
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(Command::Start),
            b'-' => Some(Command::Stop),
            b'h' => Some(Command::Hup),
            b'i' => Some(Command::Int),
            b'x' => Some(Command::Exit),
            _ => None,
        }
    }
}

const FIFO_MODE: Mode = Mode::from_bits_truncate(0o610);

fn ensure_fifo_exists(path: &Path) -> Result<(), StartupError> {
    match stat(path) {
        Ok(st) => {
            if SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT != SFlag::S_IFIFO {
                return Err(ConfigError::NotAFifo(path.to_path_buf()).into());
            }
            Ok(())
        }
        Err(Errno::ENOENT) => Ok(mkfifo(path, FIFO_MODE).map_err(SetupError::Fifo)?),
        Err(e) => Err(SetupError::Fifo(e).into()),
    }
}

/// Owns both ends of the command FIFO. The write end exists solely so the
/// read end never observes end-of-stream during normal operation.
pub struct CommandFifo {
    path: PathBuf,
    read_fd: OwnedFd,
    write_fd: OwnedFd,
}

impl CommandFifo {
    /// Creates the FIFO if absent (refusing a non-FIFO at that path), then
    /// opens it read-nonblocking and write, in that order (the reader must
    /// exist before the writer, or opening read-only-nonblocking would
    /// itself fail to find a writer and return immediately with no peer).
    pub fn create_or_reuse(path: &Path) -> Result<Self, StartupError> {
        ensure_fifo_exists(path)?;
        let read_fd = open(path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
            .map_err(SetupError::Fifo)?;
        let write_fd = open(path, OFlag::O_WRONLY, Mode::empty()).map_err(SetupError::Fifo)?;
        Ok(CommandFifo {
            path: path.to_path_buf(),
            read_fd,
            write_fd,
        })
    }

    pub fn read_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        self.read_fd.as_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write_fd.as_raw_fd()
    }

    /// Rebuilds both descriptors in place, for when the read end observes
    /// end-of-stream (shouldn't happen since we hold the write end
    /// ourselves, but we guard against it the same way `SignalPipe` does).
    fn recreate(&mut self) -> Result<(), StartupError> {
        *self = CommandFifo::create_or_reuse(&self.path)?;
        Ok(())
    }

    /// Drains every command currently queued, stopping at `EWOULDBLOCK`.
    /// Bytes outside the alphabet are logged and discarded (spec §6). If
    /// the read side ever sees end-of-stream, the FIFO is logged and
    /// recreated (spec §7 "FIFO closed unexpectedly").
    pub fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            match read(&self.read_fd, &mut buf) {
                Ok(0) => {
                    tracing::warn!("read end of command FIFO closed, recreating");
                    if let Err(e) = self.recreate() {
                        tracing::warn!(error = %e, "failed to recreate command FIFO");
                    }
                    return commands;
                }
                Err(Errno::EWOULDBLOCK) => return commands,
                Ok(_) => match Command::from_byte(buf[0]) {
                    Some(cmd) => commands.push(cmd),
                    None => tracing::warn!(byte = buf[0], "unknown FIFO command byte"),
                },
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot read from command FIFO");
                    return commands;
                }
            }
        }
    }

}

/// Opens an existing FIFO for writing and sends exactly one byte, then
/// returns — the whole of `--command`'s behavior (spec §4.5).
pub fn send_one(path: &Path, byte: u8) -> Result<(), SetupError> {
    let fd = open(path, OFlag::O_WRONLY, Mode::empty()).map_err(SetupError::Fifo)?;
    nix::unistd::write(&fd, &[byte]).map_err(SetupError::Fifo)?;
    Ok(())
}
