//! # Pubsub Runtime Library
//!
//! Demo extension built on `ext-pubsub`, exposed as a library so the
//! scenario can be tested. The entry point is the `main.rs` binary.

pub mod config;
pub mod runtime;

pub use config::{ConfigError, RuntimeConfig};
pub use runtime::{topics, Activity, ExtensionRuntime};
