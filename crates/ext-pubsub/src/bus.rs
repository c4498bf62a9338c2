//! # Message Bus
//!
//! One bus per execution context. `publish` fans an envelope out to every
//! configured transport without waiting for anything; inbound messages
//! from the host arrive through a single listener and are dispatched to
//! local subscribers in registration order.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::envelope::{Envelope, Payload};
use crate::platform::{Platform, ReplyFn, RuntimeMessaging, SenderMetadata};
use crate::registry::{Callback, SubscriptionRegistry};
use crate::subscriber::EnvelopeStream;
use crate::topic::Topic;
use crate::transport::{
    ContentScriptTransport, Delivery, ExtensionTransport, Transport, TransportError, TransportKind,
};

/// Counters since the bus was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Envelopes handed to `publish`.
    pub published: u64,
    /// Envelopes that reached at least one subscriber.
    pub dispatched: u64,
    /// Envelopes dropped on receipt (no subscribers, no topic).
    pub dropped: u64,
}

/// Result of one transport's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub transport: TransportKind,
    pub result: Result<Delivery, TransportError>,
}

#[derive(Debug)]
enum Pending {
    Done(Result<Delivery, TransportError>),
    Running(JoinHandle<Result<Delivery, TransportError>>),
}

/// Handle to the deliveries started by one `publish`.
///
/// Dropping it leaves the deliveries running.
#[derive(Debug, Default)]
pub struct PublishTicket {
    deliveries: Vec<(TransportKind, Pending)>,
}

impl PublishTicket {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait for every delivery to finish and collect the outcomes.
    pub async fn settled(self) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(self.deliveries.len());
        for (transport, pending) in self.deliveries {
            let result = match pending {
                Pending::Done(result) => result,
                Pending::Running(handle) => handle.await.unwrap_or(Err(TransportError::Aborted)),
            };
            outcomes.push(DeliveryOutcome { transport, result });
        }
        outcomes
    }
}

struct BusInner {
    registry: SubscriptionRegistry,
    transports: Vec<Arc<dyn Transport>>,
    listening: AtomicBool,
    published: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

/// Publish/subscribe bus for one execution context.
///
/// Cheap to clone; clones share the registry and transports.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// A bus with no transports. Only `dispatch` reaches its subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_transports(Vec::new())
    }

    #[must_use]
    pub fn with_transports(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: SubscriptionRegistry::new(),
                transports,
                listening: AtomicBool::new(false),
                published: AtomicU64::new(0),
                dispatched: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Build a bus for the context described by `platform` and start
    /// listening for inbound messages.
    ///
    /// The content-script transport is only configured when the context
    /// can query tabs.
    pub fn attach<P: Platform + ?Sized>(platform: &P) -> Self {
        let runtime = platform.runtime();
        let mut transports: Vec<Arc<dyn Transport>> =
            vec![Arc::new(ExtensionTransport::new(runtime.clone()))];

        match platform.tabs() {
            Some(tabs) => transports.push(Arc::new(ContentScriptTransport::new(tabs))),
            None => debug!("Tab query unavailable, content-script transport disabled"),
        }

        let bus = Self::with_transports(transports);
        bus.listen(runtime.as_ref());
        bus
    }

    /// Register the single inbound listener with the host.
    ///
    /// Returns `false` if this bus is already listening.
    pub fn listen(&self, messaging: &dyn RuntimeMessaging) -> bool {
        if self.inner.listening.swap(true, Ordering::AcqRel) {
            warn!("Bus listener already registered");
            return false;
        }

        let bus = self.downgrade();
        messaging.add_listener(Arc::new(
            move |message: Value, sender: &SenderMetadata, _reply: ReplyFn| {
                if let Some(bus) = bus.upgrade() {
                    bus.receive(message, sender);
                }
            },
        ));
        debug!(transports = self.inner.transports.len(), "Bus listener registered");
        true
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMessageBus {
        WeakMessageBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Publish `data` under `topic` to every transport.
    ///
    /// Never fails. An empty topic is logged and yields an empty ticket.
    /// Transports that can deliver without suspending run inline; the rest
    /// are spawned on the current tokio runtime, or skipped when there is
    /// none.
    pub fn publish(&self, topic: &str, data: impl Into<Option<Payload>>) -> PublishTicket {
        let Ok(topic) = Topic::new(topic) else {
            warn!("Publish with empty topic ignored");
            return PublishTicket::default();
        };
        let envelope = Envelope::new(&topic, data.into().unwrap_or_default());

        // Counted even if nothing goes out.
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        if self.inner.transports.is_empty() {
            debug!(topic = %topic, "No transports configured, nothing to deliver");
            return PublishTicket::default();
        }

        let runtime = tokio::runtime::Handle::try_current().ok();
        let mut deliveries = Vec::with_capacity(self.inner.transports.len());
        for transport in &self.inner.transports {
            let kind = transport.kind();
            if let Some(result) = transport.try_deliver(&envelope) {
                log_delivery(&topic, kind, &result);
                deliveries.push((kind, Pending::Done(result)));
                continue;
            }

            let Some(runtime) = &runtime else {
                warn!(topic = %topic, transport = %kind, "No async runtime, delivery dropped");
                continue;
            };
            let transport = transport.clone();
            let envelope = envelope.clone();
            let topic = topic.clone();
            let handle = runtime.spawn(async move {
                let result = transport.deliver(envelope).await;
                log_delivery(&topic, kind, &result);
                result
            });
            deliveries.push((kind, Pending::Running(handle)));
        }

        PublishTicket { deliveries }
    }

    /// Append `callback` to the subscribers of `topic`.
    pub fn subscribe<F>(&self, topic: &str, callback: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        if topic.is_empty() {
            warn!("Subscribe with empty topic ignored");
            return;
        }
        let callback: Callback = Arc::new(callback);
        self.inner.registry.insert(topic, callback);
    }

    /// Subscribe to `topic` and receive its envelopes as a stream.
    #[must_use]
    pub fn stream(&self, topic: &str) -> EnvelopeStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribe(topic, move |envelope: &Envelope| {
            // Receiver gone means the stream was dropped.
            let _ = sender.send(envelope.clone());
        });
        EnvelopeStream::new(topic.to_string(), receiver)
    }

    /// Invoke the subscribers of the envelope's topic, in order.
    ///
    /// Returns the number of callbacks invoked. A callback that panics is
    /// not caught here.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let topic = match envelope.require_topic() {
            Ok(topic) => topic,
            Err(e) => {
                debug!(error = %e, "Envelope without topic dropped");
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                return 0;
            }
        };

        let callbacks = self.inner.registry.callbacks(topic);
        if callbacks.is_empty() {
            trace!(topic, "No subscribers, envelope dropped");
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        trace!(topic, subscribers = callbacks.len(), "Dispatching envelope");
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
        for callback in &callbacks {
            callback(envelope);
        }
        callbacks.len()
    }

    /// Handle a raw message from the host listener.
    pub fn receive(&self, message: Value, sender: &SenderMetadata) -> usize {
        let mut envelope = match Envelope::from_value(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Inbound message dropped");
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                return 0;
            }
        };
        envelope.stamp_sender(sender);
        self.dispatch(&envelope)
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.registry.subscriber_count(topic)
    }

    /// Kinds of the configured transports, in publish order.
    #[must_use]
    pub fn transports(&self) -> Vec<TransportKind> {
        self.inner.transports.iter().map(|t| t.kind()).collect()
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

fn log_delivery(topic: &Topic, kind: TransportKind, result: &Result<Delivery, TransportError>) {
    match result {
        Ok(delivery) => {
            debug!(topic = %topic, transport = %kind, ?delivery, "Envelope delivered");
        }
        Err(TransportError::NoActiveTab) => {
            debug!(topic = %topic, transport = %kind, "No active tab, delivery skipped");
        }
        Err(e) => {
            debug!(topic = %topic, transport = %kind, error = %e, "Delivery failed");
        }
    }
}

/// Non-owning handle to a [`MessageBus`].
///
/// Subscribers that publish on their own bus hold one of these; a strong
/// clone stored in the bus's registry would keep the bus alive forever.
#[derive(Clone, Default)]
pub struct WeakMessageBus {
    inner: Weak<BusInner>,
}

impl WeakMessageBus {
    /// The bus, if any strong handle to it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<MessageBus> {
        self.inner.upgrade().map(|inner| MessageBus { inner })
    }
}

impl std::fmt::Debug for WeakMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakMessageBus")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("registry", &self.inner.registry)
            .field("transports", &self.transports())
            .field("stats", &self.stats())
            .finish()
    }
}
