//! Diagnostic tracing for the runner itself.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Runner diagnostics via `RUST_LOG`, output to
//!   stderr. Build and application output never goes through here.
//!
//! - **Build and console logs (`io/sink`)**: What the build tool and the
//!   launched application print. Always delivered, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_directive` (e.g. `warn`, or
/// `apprunner=info` for verbose CLI runs) if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=apprunner=debug apprunner run ./my-service
/// ```
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
