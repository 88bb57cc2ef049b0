//! The event loop and child lifecycle state machine.
//!
//! Grounded on `process-monitor.c`'s `monitor_child`/`handle_*_signal`
//! family: same dispatch order (PTY, then signal tokens, then FIFO
//! commands), same restart-backoff arithmetic, same exit-code policy.
//! Realized with `nix::poll` in place of raw `select`/`FD_SET`, the way
//! `MalteJ-mvirt`'s dataplane reactor does.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, alarm};

use crate::child::reap::{self, ExitClassification};
use crate::child::{self, ChildProcess};
use crate::command_fifo::{Command as FifoCommand, CommandFifo};
use crate::config::{ChildConfig, SupervisorConfig};
use crate::daemon;
use crate::error::StartupError;
use crate::log::{Level, LogSink};
use crate::pidfile::PidFileGuard;
use crate::pty_reader::{self, LineBuffer, ReadOutcome};
use crate::signal_bridge::{SignalPipe, SignalToken};

#[derive(Debug, Clone, Copy)]
struct RestartPolicy {
    monitor: bool,
    exit_when_child_dies: bool,
}

impl RestartPolicy {
    fn initial() -> Self {
        RestartPolicy { monitor: true, exit_when_child_dies: false }
    }

    fn latch_exit(&mut self) {
        self.monitor = false;
        self.exit_when_child_dies = true;
    }
}

/// Runs the whole supervised lifecycle: spawns the child, services events
/// until a terminal condition fires, and never returns (every exit path
/// goes through `std::process::exit`).
pub struct Supervisor {
    child: Option<ChildProcess>,
    /// Tracks whether the PTY master is still worth polling; distinct from
    /// `child` because `read_pty_fd()`/`handle_child_signal()` can close
    /// the pty ahead of the child actually being reaped.
    pty_open: bool,
    line_buffer: LineBuffer,
    signal_pipe: SignalPipe,
    command_fifo: CommandFifo,
    restart_policy: RestartPolicy,
    wait_time: u32,
    min_wait: u32,
    max_wait: u32,
    child_cfg: ChildConfig,
    is_daemon: bool,
    log_sink: LogSink,
    /// The supervisor's own `--log-name`/`-l` identifier — distinct from
    /// `child_cfg.log_name`, which tags lines captured from the child's PTY
    /// output (spec §6).
    log_name: String,
    _pid_file: Option<PidFileGuard>,
}

impl Supervisor {
    pub fn start(cfg: SupervisorConfig) -> Result<Self, StartupError> {
        if cfg.release_allfd {
            daemon::release_all_fds();
        }

        // Order follows the spec's startup narrative (§2): signal pipe and
        // FIFO first, then optional daemonization, then the pid file, and
        // only then the signal handlers themselves.
        let signal_pipe = SignalPipe::new()?;
        let command_fifo = CommandFifo::create_or_reuse(&cfg.command_pipe)?;

        if cfg.daemon {
            unsafe { daemon::daemonize()? };
        }

        let pid_file = cfg.pid_file.as_deref().map(PidFileGuard::create).transpose()?;
        signal_pipe.install_handlers()?;
        // The syslog ident is "name[pid]" (spec §6), built from the pid this
        // process has *after* any daemonizing fork above, so it tracks the
        // pid that actually ends up in the pid file.
        let log_sink = if cfg.daemon {
            LogSink::syslog(&format!("{}[{}]", cfg.log_name, Pid::this()))
        } else {
            LogSink::std()
        };

        for warning in &cfg.warnings {
            log_sink.log(Level::Info, &cfg.log_name, warning);
        }

        let mut supervisor = Supervisor {
            child: None,
            pty_open: false,
            line_buffer: LineBuffer::new(),
            signal_pipe,
            command_fifo,
            restart_policy: RestartPolicy::initial(),
            wait_time: cfg.min_wait,
            min_wait: cfg.min_wait,
            max_wait: cfg.max_wait,
            child_cfg: cfg.child,
            is_daemon: cfg.daemon,
            log_sink,
            log_name: cfg.log_name,
            _pid_file: pid_file,
        };
        supervisor.start_child();
        Ok(supervisor)
    }

    fn log(&self, level: Level, msg: &str) {
        self.log_sink.log(level, &self.log_name, msg);
    }

    /// Logs a line captured from the child's PTY output, tagged with
    /// `--child-log-name`/`-L` rather than the supervisor's own identifier.
    fn log_child(&self, level: Level, msg: &str) {
        self.log_sink.log(level, &self.child_cfg.log_name, msg);
    }

    fn inherited_fds(&self) -> Vec<RawFd> {
        vec![
            self.signal_pipe.read_fd(),
            self.signal_pipe.write_fd(),
            self.command_fifo.read_fd().as_raw_fd(),
            self.command_fifo.write_fd(),
        ]
    }

    fn start_child(&mut self) {
        self.log(Level::Info, &format!("starting {}", self.child_cfg.program[0]));
        let inherited = self.inherited_fds();
        match unsafe { child::spawn(&self.child_cfg, &inherited) } {
            Ok(handle) => {
                self.pty_open = true;
                self.child = Some(handle);
            }
            Err(e) => {
                self.log(Level::Warn, &format!("cannot fork: {e}"));
                self.wait_time = 60;
            }
        }
    }

    /// Runs forever. Every exit path inside the handlers calls
    /// `std::process::exit`; reaching the end of this function would be
    /// the "should not happen" fallthrough (spec exit code 88).
    ///
    /// The poll timeout here, like the original's `select()` timeout, is
    /// inert — restarts are driven entirely by the `alarm(2)`-sourced
    /// signal token, not by this loop noticing time has passed.
    pub fn run(&mut self) -> ! {
        loop {
            self.tick(Duration::from_secs(1));
        }
    }

    fn tick(&mut self, timeout: Duration) {
        let master_fd = self.child.as_ref().filter(|_| self.pty_open).map(|c| c.master.as_fd());
        let mut poll_fds = Vec::with_capacity(3);
        if let Some(fd) = &master_fd {
            poll_fds.push(PollFd::new(fd.as_fd(), PollFlags::POLLIN));
        }
        let signal_fd = self.signal_pipe.read_fd();
        let signal_borrowed = unsafe { BorrowedFd::borrow_raw(signal_fd) };
        poll_fds.push(PollFd::new(signal_borrowed, PollFlags::POLLIN));
        let fifo_fd = self.command_fifo.read_fd();
        poll_fds.push(PollFd::new(fifo_fd, PollFlags::POLLIN));

        let timeout_ms: u16 = timeout.as_millis().min(u16::MAX as u128) as u16;
        // A signal interrupting poll() (EINTR) is the common case — it's
        // how the self-pipe wakes us — and, like the original, isn't
        // treated as an error; we fall through and drain everything below
        // regardless of what poll() reported.
        if let Err(e) = poll(&mut poll_fds, PollTimeout::from(timeout_ms)) {
            if e != nix::errno::Errno::EINTR {
                self.log(Level::Warn, &format!("poll error: {e}"));
            }
        }

        // PTY first.
        if self.pty_open {
            self.drain_pty();
        }
        // Then signal tokens.
        if let Ok(tokens) = self.signal_pipe.drain() {
            for token in tokens {
                self.dispatch_signal(token);
            }
        }
        // Then FIFO commands.
        for cmd in self.command_fifo.drain() {
            self.dispatch_fifo(cmd);
        }
    }

    fn drain_pty(&mut self) {
        let Some(child) = &self.child else { return };
        let fd = child.master.as_fd();
        match pty_reader::read_pty(fd, &mut self.line_buffer) {
            ReadOutcome::Data(lines) => {
                for line in lines {
                    self.log_child(Level::Info, &line);
                }
            }
            ReadOutcome::Eof => {
                self.log(Level::Info, "pty closed");
                self.pty_open = false;
            }
            // EIO is the routine way a pty reports "the child is gone";
            // `read_pty_fd()` in the original handles it without a log
            // line, since it fires on every single exit.
            ReadOutcome::Eio => {
                self.pty_open = false;
            }
            ReadOutcome::Error(e) => {
                self.log(Level::Info, &format!("cannot read from pty: {e}"));
                self.pty_open = false;
            }
            ReadOutcome::WouldBlock => {}
        }
    }

    fn dispatch_signal(&mut self, token: SignalToken) {
        match token {
            SignalToken::Alarm => self.on_alarm(),
            SignalToken::Child => self.on_child_exit(),
            SignalToken::Hup => self.on_hup(),
            SignalToken::Int => self.on_int(),
            SignalToken::Term => self.on_term(),
            SignalToken::Usr1 => self.on_usr1(),
            SignalToken::Usr2 => self.on_usr2(),
        }
    }

    fn dispatch_fifo(&mut self, cmd: FifoCommand) {
        match cmd {
            FifoCommand::Start => self.on_usr2(),
            FifoCommand::Stop => self.on_usr1(),
            FifoCommand::Hup => self.on_hup(),
            FifoCommand::Int => self.on_int(),
            FifoCommand::Exit => self.orderly_shutdown(),
        }
    }

    fn on_alarm(&mut self) {
        if self.restart_policy.monitor && self.child.is_none() {
            self.start_child();
        }
        if self.restart_policy.exit_when_child_dies {
            self.exit_now(1);
        }
    }

    fn on_child_exit(&mut self) {
        self.drain_pty();
        let Some(child) = &self.child else { return };
        let pid = child.pid;
        let Some(classification) = reap::reap_if_matches(pid) else { return };

        if classification.should_log() {
            let program = self.child_cfg.program[0].clone();
            match classification {
                ExitClassification::Signaled(sig) => {
                    self.log(Level::Info, &format!("{program}[{pid}] exited due to signal {sig}"));
                }
                ExitClassification::Exited(code) => {
                    self.log(Level::Info, &format!("{program}[{pid}] exited with status {code}"));
                }
                ExitClassification::ExecFailureSentinel => unreachable!("excluded by should_log"),
            }
        }

        self.child = None;
        if self.pty_open {
            self.log(Level::Info, "closing pty");
            self.pty_open = false;
        }

        if self.restart_policy.exit_when_child_dies {
            self.log(Level::Info, "supervisor exiting");
            self.exit_now(0);
        } else if self.restart_policy.monitor {
            let arm_seconds = if self.wait_time == 0 { 1 } else { self.wait_time };
            self.log(Level::Info, &format!("waiting for {arm_seconds} seconds"));
            alarm::set(arm_seconds);
            self.wait_time = reap::next_wait_time(self.wait_time, self.max_wait);
        }
    }

    fn on_hup(&mut self) {
        if self.is_daemon {
            match &self.child {
                None => self.log(Level::Info, "SIGHUP but no child"),
                Some(c) => {
                    self.log(Level::Info, &format!("passing SIGHUP to {}[{}]", self.child_cfg.program[0], c.pid));
                    let _ = kill(c.pid, Signal::SIGHUP);
                }
            }
        } else {
            match &self.child {
                Some(c) => {
                    let _ = kill(c.pid, Signal::SIGHUP);
                    self.restart_policy.latch_exit();
                }
                None => {
                    self.log(Level::Info, "exiting on SIGHUP");
                    self.exit_now(1);
                }
            }
        }
    }

    fn on_int(&mut self) {
        let Some(child) = &self.child else {
            if self.is_daemon {
                self.log(Level::Info, &format!("SIGINT but no child process ({})", self.child_cfg.program[0]));
            } else {
                self.log(Level::Info, "exiting on SIGINT");
                self.exit_now(1);
            }
            return;
        };
        let pid = child.pid;
        if self.is_daemon {
            self.log(Level::Info, &format!("passing SIGINT to {}[{}]", self.child_cfg.program[0], pid));
            let _ = kill(pid, Signal::SIGINT);
        } else {
            let _ = kill(pid, Signal::SIGINT);
            self.restart_policy.latch_exit();
        }
    }

    fn on_term(&mut self) {
        match &self.child {
            None => {
                self.log(Level::Info, "exiting on SIGTERM");
                self.exit_now(1);
            }
            Some(c) => {
                self.log(Level::Info, &format!("passing SIGTERM to {}[{}]", self.child_cfg.program[0], c.pid));
                let _ = kill(c.pid, Signal::SIGTERM);
                self.restart_policy.latch_exit();
            }
        }
    }

    fn on_usr1(&mut self) {
        self.log(Level::Info, &format!("SIGUSR1: I will not monitor {}", self.child_cfg.program[0]));
        self.restart_policy.monitor = false;
    }

    fn on_usr2(&mut self) {
        self.log(Level::Info, &format!("SIGUSR2: I will monitor {} again", self.child_cfg.program[0]));
        self.restart_policy.monitor = true;
        self.restart_policy.exit_when_child_dies = false;
        self.wait_time = reap::reset_wait_time(self.min_wait);
        if self.child.is_none() {
            self.start_child();
        }
    }

    /// FIFO `'x'`: latch exit, TERM the child, force a 5-second wait, keep
    /// ticking for up to 6 seconds so PTY drain and the death event still
    /// get serviced, then KILL if still alive, then exit 0 (spec §4.5).
    fn orderly_shutdown(&mut self) {
        self.restart_policy.latch_exit();
        if let Some(child) = &self.child {
            let _ = kill(child.pid, Signal::SIGTERM);
        } else {
            self.exit_now(0);
            return;
        }
        self.wait_time = 5;

        let deadline = std::time::Instant::now() + Duration::from_secs(6);
        while self.child.is_some() && std::time::Instant::now() < deadline {
            self.tick(Duration::from_millis(200));
        }
        if let Some(child) = &self.child {
            self.log(Level::Warn, &format!("{}[{}] did not exit, sending KILL", self.child_cfg.program[0], child.pid));
            let _ = kill(child.pid, Signal::SIGKILL);
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while self.child.is_some() && std::time::Instant::now() < deadline {
                self.tick(Duration::from_millis(200));
            }
        }
        self.exit_now(0);
    }

    fn exit_now(&mut self, code: i32) -> ! {
        if let Some(mut guard) = self._pid_file.take() {
            guard.unlink();
        }
        std::process::exit(code);
    }
}
