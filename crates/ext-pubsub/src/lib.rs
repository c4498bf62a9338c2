//! # ext-pubsub - Publish/Subscribe for Browser Extensions
//!
//! Extension pages and content scripts talk to each other through two
//! different host calls: a runtime broadcast for extension-side listeners
//! and a tab-targeted send for content scripts. This crate hides both
//! behind one bus with two operations, `publish` and `subscribe`.
//!
//! ```text
//! ┌──────────────┐  publish()  ┌────────────────────────┐
//! │ Extension    │ ──────────► │ ExtensionTransport     │ ──► other extension pages
//! │ page         │             ├────────────────────────┤
//! │ (MessageBus) │             │ ContentScriptTransport │ ──► active tab's scripts
//! └──────────────┘             └────────────────────────┘
//!        ▲
//!        │ host listener ─► dispatch() ─► subscribers, in registration order
//! ```
//!
//! ## Conventions
//!
//! - Topics are past tense and namespaced by origin: `ext.wordSearched`,
//!   `cscript.wordSelected`.
//! - The topic travels inside the payload under [`TOPIC_KEY`]; inbound
//!   messages also carry [`TAB_ID_KEY`] (sender tab id, or `""` when the
//!   sender is extension-side).
//! - Delivery is fire-and-forget. Nothing is retried, acknowledged or
//!   reported back to the publisher.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod envelope;
pub mod in_process;
pub mod platform;
pub mod registry;
pub mod subscriber;
pub mod topic;
pub mod transport;

// Re-export main types
pub use bus::{BusStats, DeliveryOutcome, MessageBus, PublishTicket, WeakMessageBus};
pub use envelope::{Envelope, EnvelopeError, Payload};
pub use in_process::{ContextHandle, ContextId, ContextKind, InProcessHost};
pub use platform::{
    MessageHandler, Platform, PlatformError, ReplyFn, RuntimeMessaging, SenderMetadata, TabId,
    TabInfo, TabQuery,
};
pub use subscriber::EnvelopeStream;
pub use topic::{Origin, Topic};
pub use transport::{
    ContentScriptTransport, Delivery, ExtensionTransport, Transport, TransportError, TransportKind,
};

/// Reserved payload key holding the topic name.
pub const TOPIC_KEY: &str = "_key_";

/// Payload key holding the sender tab id on inbound messages.
pub const TAB_ID_KEY: &str = "tabId";
