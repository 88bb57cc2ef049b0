//! Assembling lines out of the PTY master's byte stream.
//!
//! Restates `read_pty_fd()`'s per-byte accumulation into a fixed buffer:
//! a line ends at `\n` or `\0`, a trailing `\r\n` is rewritten to `\n`, and
//! a line that grows past the cap is flushed anyway rather than grown
//! further. `pty/mod.rs`'s `select!` read arm is the concurrency-model
//! grounding (EIO/EWOULDBLOCK handling, forward-unmodified-bytes
//! discipline); this restates it as a synchronous buffer a caller feeds
//! from its own read loop instead of polling itself.

use std::os::fd::{AsFd, BorrowedFd};

use nix::errno::Errno;
use nix::unistd::read;

/// Matches `PTY_LINE_LEN` in the original: lines are capped at 2048 bytes
/// including the implicit terminator.
pub const LINE_CAP: usize = 2048;

/// Accumulates bytes from the PTY into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// No line boundary reached yet.
    Pending,
    /// A line is ready; fetch it with [`LineBuffer::take_line`].
    LineReady,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer { buf: Vec::with_capacity(LINE_CAP) }
    }

    /// Feeds one byte in. Returns [`PushOutcome::LineReady`] when a line
    /// just completed — either because the byte was `\n`/`\0`, or because
    /// the buffer just hit [`LINE_CAP`] and is being flushed regardless.
    pub fn push_byte(&mut self, byte: u8) -> PushOutcome {
        self.buf.push(byte);
        if byte == b'\n' || byte == b'\0' {
            PushOutcome::LineReady
        } else if self.buf.len() == LINE_CAP - 1 {
            PushOutcome::LineReady
        } else {
            PushOutcome::Pending
        }
    }

    /// Takes the accumulated line, with the `\r\n`-to-`\n` and `\0`/`\n`
    /// terminator rules applied, and resets the buffer for the next line.
    pub fn take_line(&mut self) -> String {
        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\n') && line.len() >= 2 && line[line.len() - 2] == b'\r' {
            line.remove(line.len() - 2);
        }
        while matches!(line.last(), Some(b'\n') | Some(b'\0')) {
            line.pop();
        }
        String::from_utf8_lossy(&line).into_owned()
    }
}

pub enum ReadOutcome {
    /// Bytes were read; zero or more complete lines were produced.
    Data(Vec<String>),
    /// `read()` returned 0: the pty is gone. Worth an info-level "pty
    /// closed" log, matching `read_pty_fd()`'s `ret == 0` branch.
    Eof,
    /// `read()` failed with `EIO` — the ordinary way a pty reports "the
    /// child holding the slave side is gone". Silent, by design: logging
    /// this would fire on every single child exit.
    Eio,
    /// Any other read error; the caller should log it before closing.
    Error(nix::errno::Errno),
    /// No more data available right now (`EWOULDBLOCK`); try again later.
    WouldBlock,
}

/// Reads whatever is currently available from `fd` and feeds it through
/// `lines`, matching `read_pty_fd()`'s loop: `read()` returning 0 or `EIO`
/// means the far end is gone, `EWOULDBLOCK` means come back later, and any
/// other error is logged by the caller and treated as closed.
pub fn read_pty(fd: BorrowedFd<'_>, lines: &mut LineBuffer) -> ReadOutcome {
    let mut buf = [0u8; 1024];
    match read(&fd.as_fd(), &mut buf) {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) => {
            let mut completed = Vec::new();
            for &byte in &buf[..n] {
                if lines.push_byte(byte) == PushOutcome::LineReady {
                    completed.push(lines.take_line());
                }
            }
            ReadOutcome::Data(completed)
        }
        Err(Errno::EWOULDBLOCK) => ReadOutcome::WouldBlock,
        Err(Errno::EIO) => ReadOutcome::Eio,
        Err(e) => ReadOutcome::Error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_line_is_flushed_on_newline() {
        let mut lb = LineBuffer::new();
        for b in b"hello\n" {
            let outcome = lb.push_byte(*b);
            if *b == b'\n' {
                assert_eq!(outcome, PushOutcome::LineReady);
            }
        }
        assert_eq!(lb.take_line(), "hello");
    }

    #[test]
    fn crlf_is_rewritten_to_lf() {
        let mut lb = LineBuffer::new();
        for b in b"hello\r\n" {
            lb.push_byte(*b);
        }
        assert_eq!(lb.take_line(), "hello");
    }

    #[test]
    fn nul_terminates_a_line() {
        let mut lb = LineBuffer::new();
        lb.push_byte(b'h');
        lb.push_byte(b'i');
        let outcome = lb.push_byte(0);
        assert_eq!(outcome, PushOutcome::LineReady);
        assert_eq!(lb.take_line(), "hi");
    }

    #[test]
    fn overlong_line_is_flushed_at_cap() {
        let mut lb = LineBuffer::new();
        let mut last = PushOutcome::Pending;
        for _ in 0..LINE_CAP - 1 {
            last = lb.push_byte(b'x');
        }
        assert_eq!(last, PushOutcome::LineReady);
        let line = lb.take_line();
        assert_eq!(line.len(), LINE_CAP - 1);
    }

    #[test]
    fn buffer_resets_after_take_line() {
        let mut lb = LineBuffer::new();
        for b in b"one\n" {
            lb.push_byte(*b);
        }
        assert_eq!(lb.take_line(), "one");
        for b in b"two\n" {
            lb.push_byte(*b);
        }
        assert_eq!(lb.take_line(), "two");
    }
}
