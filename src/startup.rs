//! Startup argument handling.
//!
//! The worker's own flags may appear anywhere in argv, mixed with the build
//! tool's arguments. They are split out first and parsed with clap; the
//! remainder passes through to the tool untouched.

use std::path::PathBuf;

use clap::Parser;
use dtw_worker::{ConfigError, InvokeError, WorkerConfig};
use thiserror::Error;

const PERSISTENT_WORKER_FLAG: &str = "--persistent_worker";
const WORKER_CONFIG_FLAG: &str = "--worker_config";

/// Errors that prevent the worker from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Args(#[from] clap::Error),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Invoker(#[from] InvokeError),
}

/// Flags consumed by the worker itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "doctree-worker")]
#[command(about = "Persistent documentation build worker", version)]
pub struct StartupFlags {
    /// Serve JSON build requests on stdin/stdout until end of input
    #[arg(long = "persistent_worker")]
    pub persistent_worker: bool,

    /// Worker configuration file (TOML)
    #[arg(long = "worker_config", value_name = "PATH")]
    pub worker_config: Option<PathBuf>,
}

/// How the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve requests until the input stream closes.
    PersistentWorker,
    /// Invoke the build tool once with the process arguments.
    RunOnce,
}

/// Parsed startup state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Startup {
    pub flags: StartupFlags,
    /// Arguments that belong to the build tool.
    pub tool_args: Vec<String>,
}

impl Startup {
    /// Parse process arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Self, StartupError>
    where
        I: IntoIterator<Item = String>,
    {
        let (worker_args, tool_args) = split_startup_args(args);
        let flags = StartupFlags::try_parse_from(
            std::iter::once("doctree-worker".to_string()).chain(worker_args),
        )?;
        Ok(Self { flags, tool_args })
    }

    pub fn mode(&self) -> Mode {
        if self.flags.persistent_worker {
            Mode::PersistentWorker
        } else {
            Mode::RunOnce
        }
    }

    /// Load the configuration file if one was given, else the defaults.
    pub fn load_config(&self) -> Result<WorkerConfig, StartupError> {
        match &self.flags.worker_config {
            Some(path) => Ok(WorkerConfig::from_file(path)?),
            None => Ok(WorkerConfig::default()),
        }
    }
}

/// Separate worker flags from tool arguments, preserving the tool's order.
pub fn split_startup_args<I>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut worker_args = Vec::new();
    let mut tool_args = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == PERSISTENT_WORKER_FLAG {
            worker_args.push(arg);
        } else if arg == WORKER_CONFIG_FLAG {
            worker_args.push(arg);
            if let Some(value) = iter.next() {
                worker_args.push(value);
            }
        } else if arg.starts_with(WORKER_CONFIG_FLAG) && arg[WORKER_CONFIG_FLAG.len()..].starts_with('=') {
            worker_args.push(arg);
        } else {
            tool_args.push(arg);
        }
    }

    (worker_args, tool_args)
}

/// Process exit code for a build tool status; statuses outside `0..=255`
/// become 1.
pub fn exit_status(status: i32) -> u8 {
    u8::try_from(status).unwrap_or(1)
}
