//! CLI entry point: parse arguments, then either fire a single command at
//! an already-running instance's FIFO or become the supervisor itself.

use std::process::ExitCode;

use clap::Parser;

use supervisord_mini::cli::Cli;
use supervisord_mini::command_fifo;
use supervisord_mini::config::{self, Invocation};
use supervisord_mini::log;
use supervisord_mini::supervisor::Supervisor;

fn main() -> ExitCode {
    log::init_tracing();

    let cli = Cli::parse();

    let invocation = match config::build(cli) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("supervisord-mini: {e}");
            return ExitCode::from(1);
        }
    };

    match invocation {
        Invocation::Send(send) => match command_fifo::send_one(&send.command_pipe, send.byte) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("supervisord-mini: {e}");
                ExitCode::from(2)
            }
        },
        Invocation::Supervise(cfg) => match Supervisor::start(*cfg) {
            Ok(mut supervisor) => supervisor.run(),
            Err(e) => {
                eprintln!("supervisord-mini: {e}");
                ExitCode::from(e.exit_code() as u8)
            }
        },
    }
}
