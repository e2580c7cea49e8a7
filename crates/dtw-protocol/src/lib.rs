//! Doctree Worker Protocol Types
//!
//! Defines the line-delimited JSON envelope exchanged between a build
//! driver and a persistent doctree worker: one [`WorkRequest`] per input
//! line, one [`WorkResponse`] per output line.

pub mod channel;
pub mod error;
pub mod request;
pub mod response;

pub use channel::{RequestReader, ResponseWriter};
pub use error::ProtocolError;
pub use request::{InputDescriptor, WorkRequest};
pub use response::WorkResponse;

/// Exit code reported for a successful build.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code reported when the request's build arguments fail validation.
pub const EXIT_INVALID_ARGUMENTS: i32 = 2;

/// Exit code reported for any unhandled internal failure, including
/// undecodable request lines.
pub const EXIT_INTERNAL_ERROR: i32 = 3;
