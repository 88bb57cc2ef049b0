//! Logging.
//!
//! Foreground runs get the teacher's `tracing_subscriber::fmt()` setup
//! (`init_tracing`), reading `RUST_LOG` the same way `main.rs` does. A
//! daemonized run switches to syslog instead, restating `log.c`'s
//! `vlogmsg`/`openlog`/`syslog` as a small [`LogSink`] — `nix` has no
//! syslog wrapper, so this goes through `libc` directly, the way
//! `denispol-darwin-timeout` reaches for `libc` for OS primitives outside
//! `nix`'s scope.

use std::ffi::CString;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn syslog_priority(self) -> libc::c_int {
        match self {
            Level::Info => libc::LOG_INFO,
            Level::Warn => libc::LOG_WARNING,
            Level::Error => libc::LOG_ERR,
        }
    }
}

/// Logs to syslog under a fixed ident, opened once and closed on drop.
///
/// `log.c` reopens the syslog connection only when the ident string
/// changes; we only ever log as one process (parent or, briefly, child
/// before exec replaces it), so one `openlog` at construction suffices.
pub struct SyslogSink {
    // Kept alive for the lifetime of the syslog connection: `openlog` does
    // not copy the ident string, only the pointer.
    _ident: CString,
}

impl SyslogSink {
    pub fn open(ident: &str) -> Self {
        let ident = CString::new(ident).unwrap_or_else(|_| CString::new("supervisord-mini").unwrap());
        unsafe {
            libc::openlog(ident.as_ptr(), 0, libc::LOG_DAEMON);
        }
        SyslogSink { _ident: ident }
    }

    pub fn log(&self, level: Level, msg: &str) {
        let Ok(c_msg) = CString::new(msg) else {
            return;
        };
        unsafe {
            libc::syslog(
                level.syslog_priority() | libc::LOG_DAEMON,
                c"%s".as_ptr(),
                c_msg.as_ptr(),
            );
        }
    }
}

impl Drop for SyslogSink {
    fn drop(&mut self) {
        unsafe { libc::closelog() };
    }
}

/// Selects where supervisor-level log lines (not `tracing::*!` macro calls,
/// which always go to the foreground subscriber) land: stderr/stdout in the
/// foreground, syslog once daemonized. Chosen once at startup and never
/// changed afterward, matching the spec's "two-variant sink" note.
pub enum LogSink {
    Std,
    Syslog(Mutex<SyslogSink>),
}

impl LogSink {
    pub fn std() -> Self {
        LogSink::Std
    }

    pub fn syslog(ident: &str) -> Self {
        LogSink::Syslog(Mutex::new(SyslogSink::open(ident)))
    }

    pub fn log(&self, level: Level, name: &str, msg: &str) {
        match self {
            LogSink::Std => {
                use std::io::Write as _;
                let line = format!("{name}: {msg}\n");
                // Flush explicitly: stdout/stderr are block-buffered once
                // redirected to a pipe or file, and a long-lived supervisor
                // must not sit on child output waiting for the buffer to
                // fill.
                if level == Level::Info {
                    let mut out = std::io::stdout().lock();
                    let _ = out.write_all(line.as_bytes());
                    let _ = out.flush();
                } else {
                    let mut err = std::io::stderr().lock();
                    let _ = err.write_all(line.as_bytes());
                    let _ = err.flush();
                }
            }
            LogSink::Syslog(sink) => {
                if let Ok(sink) = sink.lock() {
                    sink.log(level, msg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syslog_priority_mapping() {
        assert_eq!(Level::Info.syslog_priority(), libc::LOG_INFO);
        assert_eq!(Level::Warn.syslog_priority(), libc::LOG_WARNING);
        assert_eq!(Level::Error.syslog_priority(), libc::LOG_ERR);
    }
}
