//! Doctree Worker - persistent documentation build worker
//!
//! Runs a documentation build tool either once, passing the process
//! arguments straight through, or as a persistent worker serving
//! line-delimited JSON build requests on stdin/stdout while caching the
//! tool's doctree directory between requests.

pub mod logging;
pub mod startup;

pub use dtw_protocol::{InputDescriptor, WorkRequest, WorkResponse};
pub use dtw_worker::{ProcessInvoker, Worker, WorkerConfig};
pub use logging::init_tracing;
pub use startup::{Mode, Startup, StartupError, StartupFlags};
