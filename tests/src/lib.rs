//! # ext-pubsub Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Buses in several contexts on one in-process host
//! └── benches/           # Dispatch and publish throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pubsub-tests
//! cargo bench -p pubsub-tests
//! ```

pub mod integration;
