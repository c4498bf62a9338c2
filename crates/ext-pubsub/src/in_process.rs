//! # In-Process Host
//!
//! A stand-in for the browser host so buses in different contexts can talk
//! to each other inside one process. Each context gets its own message loop
//! (a tokio task draining an unbounded inbox), which is how the real host
//! schedules listener calls: one at a time, per context.
//!
//! ## Routing
//!
//! | Sender | Call | Reaches | Sender metadata |
//! |--------|------|---------|-----------------|
//! | extension page | `send_message` | every *other* extension page | no tab |
//! | content script | `send_message` | every extension page | sender tab |
//! | extension page | `send_to_tab` | content scripts in that tab | no tab |

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::platform::{
    MessageHandler, Platform, PlatformError, ReplyFn, RuntimeMessaging, SenderMetadata, TabId,
    TabInfo, TabQuery,
};

/// Identifier of a context within one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// What kind of code runs in a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// Background, popup or options page.
    Extension,
    /// Script injected into a tab.
    ContentScript(TabInfo),
}

struct Inbound {
    message: Value,
    sender: SenderMetadata,
}

#[derive(Clone)]
struct ContextSlot {
    id: ContextId,
    kind: ContextKind,
    inbox: mpsc::UnboundedSender<Inbound>,
}

#[derive(Default)]
struct HostInner {
    contexts: RwLock<Vec<ContextSlot>>,
    tabs: RwLock<Vec<TabInfo>>,
    active_tab: RwLock<Option<TabId>>,
    next_context: AtomicU64,
    next_tab: AtomicU32,
}

impl HostInner {
    fn targets(&self, matches: impl Fn(&ContextSlot) -> bool) -> Vec<ContextSlot> {
        self.contexts
            .read()
            .map(|contexts| contexts.iter().filter(|slot| matches(*slot)).cloned().collect())
            .unwrap_or_default()
    }

    fn active_tab(&self) -> Option<TabInfo> {
        let id = self.active_tab.read().ok().and_then(|active| *active)?;
        self.tabs
            .read()
            .ok()
            .and_then(|tabs| tabs.iter().find(|t| t.id == id).cloned())
    }

    fn post(&self, targets: &[ContextSlot], message: &Value, sender: &SenderMetadata) {
        for slot in targets {
            let inbound = Inbound {
                message: message.clone(),
                sender: sender.clone(),
            };
            if slot.inbox.send(inbound).is_err() {
                trace!(context = %slot.id, "Target message loop already stopped");
            }
        }
    }
}

/// Simulated browser host.
#[derive(Clone, Default)]
pub struct InProcessHost {
    inner: Arc<HostInner>,
}

impl InProcessHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an extension page.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn extension_context(&self) -> ContextHandle {
        self.open_context(ContextKind::Extension)
    }

    /// Inject a content script into `tab`.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn content_script(&self, tab: &TabInfo) -> ContextHandle {
        self.open_context(ContextKind::ContentScript(tab.clone()))
    }

    /// Open a new tab and make it active.
    pub fn open_tab(&self, url: &str) -> TabInfo {
        let id = TabId(self.inner.next_tab.fetch_add(1, Ordering::Relaxed) + 1);
        let tab = TabInfo {
            id,
            url: Some(url.to_string()),
        };
        if let Ok(mut tabs) = self.inner.tabs.write() {
            tabs.push(tab.clone());
        }
        self.set_active_tab(Some(id));
        debug!(tab_id = %id, url, "Tab opened");
        tab
    }

    /// Change the active tab. Returns `false` for a tab that was never opened.
    pub fn set_active_tab(&self, tab: Option<TabId>) -> bool {
        if let Some(id) = tab {
            let known = self
                .inner
                .tabs
                .read()
                .map(|tabs| tabs.iter().any(|t| t.id == id))
                .unwrap_or(false);
            if !known {
                return false;
            }
        }
        if let Ok(mut active) = self.inner.active_tab.write() {
            *active = tab;
        }
        true
    }

    #[must_use]
    pub fn active_tab(&self) -> Option<TabInfo> {
        self.inner.active_tab()
    }

    /// Number of open contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.inner.contexts.read().map(|c| c.len()).unwrap_or(0)
    }

    fn open_context(&self, kind: ContextKind) -> ContextHandle {
        let id = ContextId(self.inner.next_context.fetch_add(1, Ordering::Relaxed));
        let (inbox, receiver) = mpsc::unbounded_channel();
        let listeners: Arc<RwLock<Vec<MessageHandler>>> = Arc::default();

        tokio::spawn(run_message_loop(id, receiver, listeners.clone()));

        if let Ok(mut contexts) = self.inner.contexts.write() {
            contexts.push(ContextSlot {
                id,
                kind: kind.clone(),
                inbox,
            });
        }
        debug!(context = %id, kind = ?kind, "Context opened");

        ContextHandle {
            context: Arc::new(HostContext {
                id,
                kind,
                host: self.inner.clone(),
                listeners,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for InProcessHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessHost")
            .field("contexts", &self.context_count())
            .field("active_tab", &self.active_tab())
            .finish()
    }
}

/// Delivers queued messages to the context's listeners one at a time.
async fn run_message_loop(
    id: ContextId,
    mut inbox: mpsc::UnboundedReceiver<Inbound>,
    listeners: Arc<RwLock<Vec<MessageHandler>>>,
) {
    while let Some(Inbound { message, sender }) = inbox.recv().await {
        let handlers = listeners.read().map(|l| l.clone()).unwrap_or_default();
        for handler in handlers {
            let reply: ReplyFn = Box::new(move |_response: Value| {
                trace!(context = %id, "Listener reply discarded");
            });
            let call = AssertUnwindSafe(|| handler(message.clone(), &sender, reply));
            if std::panic::catch_unwind(call).is_err() {
                error!(context = %id, "Uncaught panic in message listener");
            }
        }
    }
    debug!(context = %id, "Message loop stopped");
}

/// One context's view of the host.
pub struct HostContext {
    id: ContextId,
    kind: ContextKind,
    host: Arc<HostInner>,
    listeners: Arc<RwLock<Vec<MessageHandler>>>,
    closed: AtomicBool,
}

impl HostContext {
    fn ensure_open(&self) -> Result<(), PlatformError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PlatformError::ContextClosed);
        }
        Ok(())
    }
}

impl RuntimeMessaging for HostContext {
    fn send_message(&self, message: Value) -> Result<(), PlatformError> {
        self.ensure_open()?;
        let (targets, sender) = match &self.kind {
            ContextKind::Extension => (
                self.host.targets(|slot| {
                    slot.kind == ContextKind::Extension && slot.id != self.id
                }),
                SenderMetadata::extension(),
            ),
            ContextKind::ContentScript(tab) => (
                self.host
                    .targets(|slot| slot.kind == ContextKind::Extension),
                SenderMetadata::content_script(tab.clone()),
            ),
        };
        trace!(context = %self.id, receivers = targets.len(), "Runtime message sent");
        self.host.post(&targets, &message, &sender);
        Ok(())
    }

    fn add_listener(&self, handler: MessageHandler) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(handler);
        }
    }
}

#[async_trait]
impl TabQuery for HostContext {
    async fn active_tab(&self) -> Option<TabInfo> {
        // Tab lookups are asynchronous on the real host.
        tokio::task::yield_now().await;
        self.host.active_tab()
    }

    fn send_to_tab(&self, tab: TabId, message: Value) -> Result<(), PlatformError> {
        self.ensure_open()?;
        let targets = self.host.targets(|slot| {
            matches!(&slot.kind, ContextKind::ContentScript(info) if info.id == tab)
        });
        if targets.is_empty() {
            return Err(PlatformError::NoReceiver(tab));
        }
        trace!(context = %self.id, tab_id = %tab, receivers = targets.len(), "Tab message sent");
        self.host.post(&targets, &message, &SenderMetadata::extension());
        Ok(())
    }
}

/// Handle to an open context; implements [`Platform`].
#[derive(Clone)]
pub struct ContextHandle {
    context: Arc<HostContext>,
}

impl ContextHandle {
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.context.id
    }

    #[must_use]
    pub fn kind(&self) -> &ContextKind {
        &self.context.kind
    }

    /// Tear the context down. Its message loop stops and further sends fail.
    pub fn close(&self) {
        if self.context.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut contexts) = self.context.host.contexts.write() {
            contexts.retain(|slot| slot.id != self.context.id);
        }
        debug!(context = %self.context.id, "Context closed");
    }
}

impl Platform for ContextHandle {
    fn runtime(&self) -> Arc<dyn RuntimeMessaging> {
        self.context.clone()
    }

    fn tabs(&self) -> Option<Arc<dyn TabQuery>> {
        match self.context.kind {
            ContextKind::Extension => Some(self.context.clone()),
            ContextKind::ContentScript(_) => None,
        }
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.context.id)
            .field("kind", &self.context.kind)
            .finish()
    }
}
