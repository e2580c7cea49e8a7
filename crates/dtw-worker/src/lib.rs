//! Doctree Worker
//!
//! A persistent worker that serves sequential documentation builds over a
//! line-delimited JSON channel. Between requests it keeps two pieces of
//! state the build tool would otherwise lose when its working directory is
//! wiped:
//!
//! - **Cache store**: a full in-memory snapshot of the tool's
//!   intermediate-state (doctree) directory, replayed to disk before each
//!   build and recaptured after it.
//! - **Digest tracker**: the previous and current input digests, diffed
//!   into a change set written next to the doctrees for the tool to consult.
//!
//! The build tool itself sits behind [`BuildInvoker`]; [`ProcessInvoker`]
//! runs it as a subprocess.

pub mod args;
pub mod cache;
pub mod config;
pub mod digest;
pub mod invoker;
pub mod worker;

pub use args::{ArgsError, BuildArgs, StagedBuild};
pub use cache::{CacheError, CacheResult, CacheStore};
pub use config::{ConfigError, WorkerConfig};
pub use digest::{ChangeSet, DigestTracker, DocumentNaming};
pub use invoker::{BuildInvoker, BuildOutcome, InvokeError, ProcessInvoker};
pub use worker::{RunSummary, Worker, WorkerError, WorkerState};
