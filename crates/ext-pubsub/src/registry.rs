//! # Subscription Registry
//!
//! Topic to callback-list mapping. Append-only: callbacks are kept in
//! registration order, duplicates are allowed and nothing is ever removed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::envelope::Envelope;

/// A subscriber callback.
pub type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: RwLock<HashMap<String, Vec<Callback>>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the list for `topic`.
    pub fn insert(&self, topic: &str, callback: Callback) {
        let Ok(mut topics) = self.topics.write() else {
            return;
        };
        let callbacks = topics.entry(topic.to_string()).or_default();
        callbacks.push(callback);
        debug!(topic, subscribers = callbacks.len(), "Subscriber registered");
    }

    /// Snapshot of the callbacks for `topic`, in registration order.
    ///
    /// Returned by value so callers can invoke them without holding the lock.
    #[must_use]
    pub fn callbacks(&self, topic: &str) -> Vec<Callback> {
        self.topics
            .read()
            .ok()
            .and_then(|topics| topics.get(topic).cloned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .map(|topics| topics.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Topics with at least one subscriber, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .topics
            .read()
            .map(|topics| topics.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}
