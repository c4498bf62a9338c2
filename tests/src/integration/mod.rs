//! # Cross-Context Integration Tests
//!
//! Every test opens real contexts on an [`ext_pubsub::InProcessHost`],
//! attaches one bus per context and checks what arrives where.

#[cfg(test)]
mod cross_context;
#[cfg(test)]
mod fixtures;
