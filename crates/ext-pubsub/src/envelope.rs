//! # Envelope
//!
//! The wire shape of a message: a flat JSON object carrying the caller's
//! fields, the topic under [`TOPIC_KEY`], and on inbound messages the
//! sender tab under [`TAB_ID_KEY`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::platform::{SenderMetadata, TabId};
use crate::topic::Topic;
use crate::{TAB_ID_KEY, TOPIC_KEY};

/// Caller-supplied message data.
pub type Payload = Map<String, Value>;

/// Errors from building or reading envelopes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Topic names must not be empty.
    #[error("Topic name is empty")]
    EmptyTopic,

    /// Inbound message was not a JSON object.
    #[error("Message is not an object (got {0})")]
    NotAnObject(&'static str),

    /// Inbound message has no string under the reserved topic key.
    #[error("Message has no `{}` field", TOPIC_KEY)]
    MissingTopic,
}

/// A message as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Wrap `data` for publishing under `topic`.
    ///
    /// A caller field already named [`TOPIC_KEY`] is overwritten.
    #[must_use]
    pub fn new(topic: &Topic, data: Payload) -> Self {
        let mut fields = data;
        if let Some(previous) = fields.insert(TOPIC_KEY.to_string(), Value::from(topic.as_str())) {
            debug!(
                topic = %topic,
                previous = %previous,
                "Reserved topic key in payload overwritten"
            );
        }
        Self(fields)
    }

    /// Parse an inbound host message.
    pub fn from_value(message: Value) -> Result<Self, EnvelopeError> {
        match message {
            Value::Object(fields) => Ok(Self(fields)),
            Value::Null => Err(EnvelopeError::NotAnObject("null")),
            Value::Bool(_) => Err(EnvelopeError::NotAnObject("bool")),
            Value::Number(_) => Err(EnvelopeError::NotAnObject("number")),
            Value::String(_) => Err(EnvelopeError::NotAnObject("string")),
            Value::Array(_) => Err(EnvelopeError::NotAnObject("array")),
        }
    }

    /// Topic string stored under the reserved key.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.0.get(TOPIC_KEY).and_then(Value::as_str)
    }

    /// Topic, or why there is none.
    pub fn require_topic(&self) -> Result<&str, EnvelopeError> {
        match self.topic() {
            Some("") => Err(EnvelopeError::EmptyTopic),
            Some(topic) => Ok(topic),
            None => Err(EnvelopeError::MissingTopic),
        }
    }

    /// Sender tab, present only on messages that came from a content script.
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        self.0
            .get(TAB_ID_KEY)
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .map(TabId)
    }

    /// Record the sender: the tab id for content scripts, `""` otherwise.
    pub fn stamp_sender(&mut self, sender: &SenderMetadata) {
        let tab = match &sender.tab {
            Some(tab) => Value::from(tab.id.0),
            None => Value::from(""),
        };
        self.0.insert(TAB_ID_KEY.to_string(), tab);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All fields, reserved keys included.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Caller fields with the reserved keys removed.
    #[must_use]
    pub fn payload(&self) -> Payload {
        self.0
            .iter()
            .filter(|(key, _)| key.as_str() != TOPIC_KEY && key.as_str() != TAB_ID_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
