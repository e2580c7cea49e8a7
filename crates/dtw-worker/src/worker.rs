//! Persistent worker loop.
//!
//! Serves requests strictly one at a time:
//!
//! ```text
//! Idle --request--> Processing --response--> Idle
//! Idle --end of stream--> ShuttingDown
//! ```
//!
//! Per request: restore the doctree cache, diff input digests and write the
//! change set, run the build, capture the doctree cache, respond. The cache
//! is restored only into the directory it was captured from; a request for
//! another doctree directory starts from whatever that directory holds. Every
//! failure inside a request, a panic included, becomes exactly one
//! response; only the channel closing (or failing) ends the loop.

use std::any::Any;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use dtw_protocol::{
    ProtocolError, RequestReader, ResponseWriter, WorkRequest, WorkResponse,
    EXIT_INTERNAL_ERROR, EXIT_INVALID_ARGUMENTS,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::args::{ArgsError, BuildArgs};
use crate::cache::{CacheError, CacheStore};
use crate::config::WorkerConfig;
use crate::digest::{DigestTracker, DocumentNaming};
use crate::invoker::{BuildInvoker, InvokeError};

/// Failures that abort a single request.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid build arguments: {0}")]
    Arguments(#[from] ArgsError),

    #[error("undecodable request: {0}")]
    Protocol(#[source] ProtocolError),

    #[error("failed to prepare doctree directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("doctree cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to write change set {path}: {source}")]
    ChangeSet {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("build invocation failed: {0}")]
    Invoke(#[from] InvokeError),

    #[error("panic while processing request: {0}")]
    Panic(String),
}

impl WorkerError {
    /// Exit code reported in the response.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => EXIT_INVALID_ARGUMENTS,
            _ => EXIT_INTERNAL_ERROR,
        }
    }
}

/// Worker loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
    ShuttingDown,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Responses written.
    pub responses: usize,
    /// Cancel requests received (no response written).
    pub cancelled: usize,
    /// Responses with a non-zero exit code.
    pub failures: usize,
}

/// A persistent worker owning the cache and digest state for its lifetime.
pub struct Worker<I> {
    config: WorkerConfig,
    invoker: I,
    cache: CacheStore,
    digests: DigestTracker,
    state: WorkerState,
    last_arguments: Vec<String>,
}

impl<I: BuildInvoker> Worker<I> {
    pub fn new(config: WorkerConfig, invoker: I) -> Self {
        Self {
            config,
            invoker,
            cache: CacheStore::new(),
            digests: DigestTracker::new(),
            state: WorkerState::Idle,
            last_arguments: Vec::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn digests(&self) -> &DigestTracker {
        &self.digests
    }

    /// Arguments of the most recent build request.
    pub fn last_arguments(&self) -> &[String] {
        &self.last_arguments
    }

    /// Serve requests from `input` until end of stream.
    ///
    /// Returns an error only if the channel itself fails.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<RunSummary, ProtocolError> {
        let mut requests = RequestReader::new(input);
        let mut responses = ResponseWriter::new(output);
        let mut summary = RunSummary::default();

        info!(worker_root = %self.config.worker_root.display(), "worker loop started");
        self.state = WorkerState::Idle;

        loop {
            let received = requests.receive();
            let response = match received {
                Ok(None) => break,
                Ok(Some(request)) => match self.handle(&request) {
                    Some(response) => response,
                    None => {
                        summary.cancelled += 1;
                        continue;
                    }
                },
                Err(err) if err.is_recoverable() => {
                    let request_id = match &err {
                        ProtocolError::Malformed { request_id, .. } => *request_id,
                        _ => 0,
                    };
                    warn!(request_id, error = %err, "received malformed request");
                    failure_response(request_id, &WorkerError::Protocol(err), None)
                }
                Err(err) => {
                    self.state = WorkerState::ShuttingDown;
                    error!(error = %err, "request channel failed");
                    return Err(err);
                }
            };

            if !response.is_success() {
                summary.failures += 1;
            }
            if let Err(err) = responses.send(&response) {
                self.state = WorkerState::ShuttingDown;
                error!(error = %err, "response channel failed");
                return Err(err);
            }
            summary.responses += 1;
        }

        self.state = WorkerState::ShuttingDown;
        info!(
            responses = summary.responses,
            cancelled = summary.cancelled,
            failures = summary.failures,
            "input closed, worker loop finished"
        );
        Ok(summary)
    }

    /// Handle one decoded request. Returns `None` for a cancel request.
    pub fn handle(&mut self, request: &WorkRequest) -> Option<WorkResponse> {
        if request.cancel {
            debug!(request_id = request.request_id, "ignoring cancel request");
            return None;
        }

        self.state = WorkerState::Processing;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process(request)))
            .unwrap_or_else(|payload| Err(WorkerError::Panic(panic_message(payload.as_ref()))));
        self.state = WorkerState::Idle;

        Some(match result {
            Ok(response) => response,
            Err(err) => {
                error!(request_id = request.request_id, exit_code = err.exit_code(), error = %err, "request failed");
                failure_response(request.request_id, &err, Some(request))
            }
        })
    }

    fn process(&mut self, request: &WorkRequest) -> Result<WorkResponse, WorkerError> {
        let request_id = request.request_id;
        info!(request_id, arguments = ?request.arguments, inputs = request.inputs.len(), "processing request");
        self.last_arguments = request.arguments.clone();

        let args = BuildArgs::parse(&request.arguments)?;
        let staged = args.stage(&self.config.worker_root);
        let doctree_dir = &staged.doctree_dir;
        fs::create_dir_all(doctree_dir).map_err(|source| WorkerError::Prepare {
            path: doctree_dir.clone(),
            source,
        })?;

        // Entries from another doctree directory belong to a different
        // source/conf/builder and must not leak into this one.
        let restored = if self.cache.is_captured_from(doctree_dir) {
            self.cache.restore(doctree_dir)?
        } else {
            if let Some(previous) = self.cache.root() {
                debug!(
                    request_id,
                    previous = %previous.display(),
                    current = %doctree_dir.display(),
                    "doctree directory changed, starting cold"
                );
            }
            0
        };

        let prefix = self.config.source_prefix.as_deref().unwrap_or(&args.source_dir);
        let naming = DocumentNaming::new(prefix, &self.config.doc_suffixes);
        let changes = self.digests.update(&request.inputs, &naming);
        let digest_path = doctree_dir.join(&self.config.digest_file);
        changes.write_to(&digest_path).map_err(|source| WorkerError::ChangeSet {
            path: digest_path.clone(),
            source,
        })?;
        info!(
            request_id,
            doctree_dir = %doctree_dir.display(),
            restored,
            changed_documents = changes.len(),
            added = changes.added(),
            removed = changes.removed(),
            modified = changes.modified(),
            "staged build"
        );

        let outcome = self.invoker.invoke(&staged.arguments)?;
        // Captured whatever the status: the cache mirrors the tool's on-disk state.
        let captured = self.cache.snapshot(doctree_dir)?;
        info!(request_id, status = outcome.status, captured, "build finished");

        if outcome.success() {
            Ok(WorkResponse::success(request_id))
        } else {
            let output = if outcome.output.is_empty() {
                format!("build exited with status {}", outcome.status)
            } else {
                outcome.output
            };
            Ok(WorkResponse::failure(request_id, outcome.status, output))
        }
    }
}

/// Build the single failure response for `err`, describing the error and,
/// when known, the originating request.
fn failure_response(request_id: i64, err: &WorkerError, request: Option<&WorkRequest>) -> WorkResponse {
    // Every message already embeds its cause.
    let mut output = err.to_string();

    match (request, err) {
        (Some(request), _) => {
            let encoded = serde_json::to_string(request).unwrap_or_else(|_| format!("{:?}", request));
            let _ = write!(output, "\nrequest: {}", encoded);
        }
        (None, WorkerError::Protocol(ProtocolError::Malformed { line, .. })) => {
            let _ = write!(output, "\nrequest line: {}", line);
        }
        (None, _) => {}
    }

    WorkResponse::failure(request_id, err.exit_code(), output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
