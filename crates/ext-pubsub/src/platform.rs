//! # Host Platform
//!
//! The browser host supplies the actual cross-context messaging. These
//! traits describe the two capabilities the bus needs from it:
//!
//! - [`RuntimeMessaging`]: send to extension-side listeners and register an
//!   inbound listener. Available in every context.
//! - [`TabQuery`]: resolve the active tab and send into its content scripts.
//!   Only extension-side contexts have it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Host-assigned tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the host knows about a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TabInfo {
    #[must_use]
    pub fn new(id: TabId) -> Self {
        Self { id, url: None }
    }
}

/// Sender information passed alongside every inbound message.
///
/// `tab` is only populated when the sender is a content script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderMetadata {
    pub tab: Option<TabInfo>,
}

impl SenderMetadata {
    /// Metadata for an extension-side sender.
    #[must_use]
    pub fn extension() -> Self {
        Self { tab: None }
    }

    /// Metadata for a content script running in `tab`.
    #[must_use]
    pub fn content_script(tab: TabInfo) -> Self {
        Self { tab: Some(tab) }
    }
}

/// Errors reported by the host messaging layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// No listener exists in the target tab.
    #[error("Could not establish connection: no receiver in tab {0}")]
    NoReceiver(TabId),

    /// The sending context has been torn down.
    #[error("Messaging context closed")]
    ContextClosed,
}

/// One-shot reply channel handed to every listener. The bus never calls it.
pub type ReplyFn = Box<dyn FnOnce(Value) + Send>;

/// Inbound message handler registered with the host.
pub type MessageHandler = Arc<dyn Fn(Value, &SenderMetadata, ReplyFn) + Send + Sync>;

/// Messaging to and from extension-side listeners.
pub trait RuntimeMessaging: Send + Sync {
    /// Send a message to extension-side listeners. Does not wait for delivery.
    fn send_message(&self, message: Value) -> Result<(), PlatformError>;

    /// Register a handler for messages arriving in this context.
    fn add_listener(&self, handler: MessageHandler);
}

/// Tab lookup and tab-targeted messaging, extension context only.
#[async_trait]
pub trait TabQuery: Send + Sync {
    /// Resolve the currently active tab, if any.
    async fn active_tab(&self) -> Option<TabInfo>;

    /// Send a message to the content scripts running in `tab`.
    fn send_to_tab(&self, tab: TabId, message: Value) -> Result<(), PlatformError>;
}

/// Capabilities of the execution context the bus runs in.
pub trait Platform {
    /// Runtime messaging, present everywhere.
    fn runtime(&self) -> Arc<dyn RuntimeMessaging>;

    /// Tab capability; `None` inside a content script.
    fn tabs(&self) -> Option<Arc<dyn TabQuery>>;
}
