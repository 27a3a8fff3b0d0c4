//! Diagnostics via `tracing`.
//!
//! - **Tracing (this module)**: lifecycle events and warnings, filtered by
//!   `RUST_LOG`, written to stderr.
//! - **Product output**: run records, logs under the run directory, and the
//!   tables/JSON printed by `list`/`status`. Unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=moco=debug moco run -- python train.py
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
