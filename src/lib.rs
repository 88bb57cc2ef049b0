//! Library half of `supervisord-mini`.
//!
//! Split out from the binary the way `procguard`/`darwin-timeout` is, so
//! integration tests can drive individual components (env parsing, line
//! assembly, the FIFO) without going through a whole subprocess every time.
//! `main.rs` is the thin CLI-dispatch wrapper around what lives here.

pub mod child;
pub mod cli;
pub mod command_fifo;
pub mod config;
pub mod daemon;
pub mod envlist;
pub mod error;
pub mod log;
pub mod pidfile;
pub mod pty_reader;
pub mod signal_bridge;
pub mod supervisor;
