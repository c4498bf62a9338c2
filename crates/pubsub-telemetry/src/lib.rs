//! # Pubsub Telemetry
//!
//! Logging setup shared by every binary in the workspace.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pubsub_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PUBSUB_SERVICE_NAME` | `ext-pubsub` | Service name in logs |
//! | `PUBSUB_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honoured) |
//! | `PUBSUB_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PUBSUB_JSON_LOGS` | `false` | JSON log lines (default on in containers) |

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::env_filter;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Install the global tracing subscriber described by `config`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_setup::init_tracing(config)
}

/// Span carrying the execution context name.
///
/// ```rust,ignore
/// let span = pubsub_telemetry::context_span!("dispatch", "background", topic = "ext.a");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! context_span {
    ($name:expr, $context:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name, context = %$context $(, $($field)*)?)
    };
}
