//! Entry point (spec §6 "CLI (external, minimal; not core)"): parse the CLI
//! and hand off to [`x0d::run`], mapping the result onto the process's
//! exit code. All real logic lives in the library half of this crate
//! (`src/lib.rs`) so it can be driven directly from integration tests.

use std::process::ExitCode;

use clap::Parser;
use x0d::cli::Cli;

fn main() -> ExitCode {
    x0d::logging::init_tracing();
    let cli = Cli::parse();

    match x0d::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "x0d exiting");
            eprintln!("x0d: {err}");
            ExitCode::from(err.exit_kind().code() as u8)
        }
    }
}
