//! Pid-file lifecycle.
//!
//! Restates `process-monitor.c`'s `fopen`/`fprintf`/`atexit(delete_pid_file)`
//! sequence as an RAII guard in the style of the teacher's `TerminalGuard`:
//! the [`Drop`] impl is the safety net, with an explicit
//! [`unlink`](PidFileGuard::unlink) available for the orderly-shutdown path
//! that wants cleanup to happen before other exit bookkeeping.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::error::SetupError;

pub struct PidFileGuard {
    path: PathBuf,
    unlinked: bool,
}

impl PidFileGuard {
    /// Writes the current pid, followed by a newline, to `path`.
    pub fn create(path: &Path) -> Result<Self, SetupError> {
        let mut f = fs::File::create(path).map_err(|e| SetupError::PidFile(path.to_path_buf(), e))?;
        writeln!(f, "{}", Pid::this()).map_err(|e| SetupError::PidFile(path.to_path_buf(), e))?;
        Ok(PidFileGuard {
            path: path.to_path_buf(),
            unlinked: false,
        })
    }

    /// Removes the pid file now, instead of waiting for drop. Matches
    /// `delete_pid_file()`'s unlink-and-warn-on-failure behavior.
    pub fn unlink(&mut self) {
        if self.unlinked {
            return;
        }
        self.unlinked = true;
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        self.unlink();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_writes_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        let guard = PidFileGuard::create(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), Pid::this().to_string());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn unlink_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        let mut guard = PidFileGuard::create(&path).unwrap();
        guard.unlink();
        assert!(!path.exists());
        guard.unlink();
    }
}
