//! Logging setup.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: Once = Once::new();

/// Initialize the global subscriber. Safe to call multiple times.
///
/// Logs go to stderr only: in worker mode stdout carries responses.
/// Defaults to `info`; override with `RUST_LOG` (e.g. `RUST_LOG=debug`,
/// or `RUST_LOG=info,tool=debug` to see the build tool's output).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();
    });
}
