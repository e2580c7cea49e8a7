//! Build tool invocation.
//!
//! The worker treats the documentation tool as an opaque function from an
//! argument list to a status code. [`ProcessInvoker`] runs it as a child
//! process; tests and embedders may pass any
//! `FnMut(&[String]) -> io::Result<i32>` instead.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;

/// Status reported when the tool's exit status carries no code.
const UNKNOWN_STATUS: i32 = 1;

/// Errors from running the build tool. A non-zero exit is not an error.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("build command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("build tool failed: {0}")]
    Tool(#[source] io::Error),
}

/// Result of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    /// The tool's exit status; 0 is success.
    pub status: i32,
    /// Captured tool output, possibly truncated to its tail.
    pub output: String,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs one build with the given arguments.
pub trait BuildInvoker {
    fn invoke(&mut self, arguments: &[String]) -> Result<BuildOutcome, InvokeError>;
}

impl<F> BuildInvoker for F
where
    F: FnMut(&[String]) -> io::Result<i32>,
{
    fn invoke(&mut self, arguments: &[String]) -> Result<BuildOutcome, InvokeError> {
        let status = self(arguments).map_err(InvokeError::Tool)?;
        Ok(BuildOutcome {
            status,
            output: String::new(),
        })
    }
}

/// Runs the build tool as a child process.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: String,
    leading_args: Vec<String>,
    max_output_bytes: usize,
}

impl ProcessInvoker {
    /// Create an invoker for `command` (program followed by leading
    /// arguments).
    pub fn new(command: &[String], max_output_bytes: usize) -> Result<Self, InvokeError> {
        let (program, leading_args) = command.split_first().ok_or(InvokeError::EmptyCommand)?;
        if program.is_empty() {
            return Err(InvokeError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            leading_args: leading_args.to_vec(),
            max_output_bytes,
        })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self, InvokeError> {
        Self::new(&config.build_command, config.max_output_bytes)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, arguments: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).args(arguments);
        command
    }

    /// Run with inherited stdio and return the tool's status. Used by
    /// run-once mode, where stdout does not carry the protocol.
    pub fn run_inherited(&self, arguments: &[String]) -> Result<i32, InvokeError> {
        info!(program = %self.program, ?arguments, "running build tool");
        let status = self
            .command(arguments)
            .status()
            .map_err(|source| InvokeError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok(status_code(status))
    }
}

impl BuildInvoker for ProcessInvoker {
    /// Run with stdin closed and stdout/stderr captured, so that nothing the
    /// tool prints can reach the worker's response stream.
    fn invoke(&mut self, arguments: &[String]) -> Result<BuildOutcome, InvokeError> {
        debug!(program = %self.program, ?arguments, "spawning build tool");
        let mut child = self
            .command(arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InvokeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, "stdout", tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, "stderr", tx.clone()));
        }
        drop(tx);

        // Ends once both pipes reach EOF.
        let mut output = OutputTail::new(self.max_output_bytes);
        for (stream, line) in rx {
            debug!(target: "tool", stream, "{}", line);
            output.push_line(&line);
        }

        let status = child.wait().map_err(|source| InvokeError::Wait {
            program: self.program.clone(),
            source,
        })?;
        for reader in readers {
            if reader.join().is_err() {
                warn!(program = %self.program, "output reader thread panicked, tool output may be incomplete");
            }
        }

        Ok(BuildOutcome {
            status: status_code(status),
            output: output.into_string(),
        })
    }
}

/// Stream lines from a child pipe to `tx` on a background thread.
fn forward_lines<R>(pipe: R, stream: &'static str, tx: Sender<(&'static str, String)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Err(err) => {
                    warn!(stream, error = %err, "failed to read tool output");
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Exit code, or `128 + signal` for a child killed by a signal.
fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    UNKNOWN_STATUS
}

/// Keeps the last `max_bytes` of captured output.
struct OutputTail {
    buffer: String,
    max_bytes: usize,
    truncated: bool,
}

impl OutputTail {
    fn new(max_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_bytes,
            truncated: false,
        }
    }

    fn push_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if self.buffer.len() > self.max_bytes {
            let mut cut = self.buffer.len() - self.max_bytes;
            while !self.buffer.is_char_boundary(cut) {
                cut += 1;
            }
            self.buffer.drain(..cut);
            self.truncated = true;
        }
    }

    fn into_string(self) -> String {
        if self.truncated {
            format!("[output truncated]\n{}", self.buffer)
        } else {
            self.buffer
        }
    }
}
