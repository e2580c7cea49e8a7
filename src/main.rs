//! Doctree Worker CLI
//!
//! Usage:
//!   doctree-worker [--worker_config PATH] <tool args...>
//!   doctree-worker --persistent_worker [--worker_config PATH]

use std::io;
use std::process::ExitCode;

use doctree_worker::startup::exit_status;
use doctree_worker::{init_tracing, Mode, ProcessInvoker, Startup, StartupError, Worker};
use tracing::{debug, error, info};

fn main() -> ExitCode {
    init_tracing();

    let startup = match Startup::from_args(std::env::args().skip(1)) {
        Ok(startup) => startup,
        Err(StartupError::Args(e)) => e.exit(),
        Err(e) => {
            error!(error = %e, "invalid startup arguments");
            return ExitCode::FAILURE;
        }
    };

    match run(startup) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "worker failed to start");
            ExitCode::FAILURE
        }
    }
}

fn run(startup: Startup) -> Result<ExitCode, StartupError> {
    let config = startup.load_config()?;
    let invoker = ProcessInvoker::from_config(&config)?;

    match startup.mode() {
        Mode::PersistentWorker => {
            info!(program = invoker.program(), "starting in persistent worker mode");
            if !startup.tool_args.is_empty() {
                debug!(ignored = ?startup.tool_args, "startup tool arguments are ignored in worker mode");
            }

            let mut worker = Worker::new(config, invoker);
            match worker.run(io::stdin().lock(), io::stdout().lock()) {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    error!(error = %e, "worker channel failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Mode::RunOnce => {
            let status = invoker.run_inherited(&startup.tool_args)?;
            Ok(ExitCode::from(exit_status(status)))
        }
    }
}
