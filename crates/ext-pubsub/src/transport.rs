//! # Transports
//!
//! A transport is one delivery path out of the current context. The bus
//! hands every published envelope to each configured transport and does
//! not look at the result beyond logging it.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::platform::{PlatformError, RuntimeMessaging, TabId, TabQuery};

/// Which context a transport delivers into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Extension pages (background, popup, options).
    Extension,
    /// Content scripts of the active tab.
    ContentScript,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension => f.write_str("extension"),
            Self::ContentScript => f.write_str("content-script"),
        }
    }
}

/// A successful hand-off to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Broadcast to extension-side listeners.
    Broadcast,
    /// Sent to the content scripts of a tab.
    Tab(TabId),
}

/// Why a delivery did not happen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No tab is active; nothing to deliver to.
    #[error("No active tab")]
    NoActiveTab,

    /// The host refused the message.
    #[error("Host messaging failed: {0}")]
    Platform(#[from] PlatformError),

    /// The delivery task was cancelled or panicked.
    #[error("Delivery task aborted")]
    Aborted,
}

/// One delivery path.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Hand `envelope` to the host. Never waits for the receiver.
    async fn deliver(&self, envelope: Envelope) -> Result<Delivery, TransportError>;

    /// Deliver without suspending, if this transport never needs to.
    ///
    /// `None` means the delivery has to go through [`Transport::deliver`].
    fn try_deliver(&self, _envelope: &Envelope) -> Option<Result<Delivery, TransportError>> {
        None
    }
}

/// Broadcast to extension-side listeners.
pub struct ExtensionTransport {
    runtime: Arc<dyn RuntimeMessaging>,
}

impl ExtensionTransport {
    #[must_use]
    pub fn new(runtime: Arc<dyn RuntimeMessaging>) -> Self {
        Self { runtime }
    }

    fn broadcast(&self, message: serde_json::Value) -> Result<Delivery, TransportError> {
        self.runtime.send_message(message)?;
        Ok(Delivery::Broadcast)
    }
}

#[async_trait]
impl Transport for ExtensionTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Extension
    }

    async fn deliver(&self, envelope: Envelope) -> Result<Delivery, TransportError> {
        self.broadcast(envelope.into_value())
    }

    fn try_deliver(&self, envelope: &Envelope) -> Option<Result<Delivery, TransportError>> {
        Some(self.broadcast(envelope.clone().into_value()))
    }
}

/// Deliver to the content scripts of whichever tab is active at send time.
pub struct ContentScriptTransport {
    tabs: Arc<dyn TabQuery>,
}

impl ContentScriptTransport {
    #[must_use]
    pub fn new(tabs: Arc<dyn TabQuery>) -> Self {
        Self { tabs }
    }
}

#[async_trait]
impl Transport for ContentScriptTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ContentScript
    }

    async fn deliver(&self, envelope: Envelope) -> Result<Delivery, TransportError> {
        let Some(tab) = self.tabs.active_tab().await else {
            return Err(TransportError::NoActiveTab);
        };
        self.tabs.send_to_tab(tab.id, envelope.into_value())?;
        Ok(Delivery::Tab(tab.id))
    }
}
