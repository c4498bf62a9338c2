//! # Topics
//!
//! Topic names follow the `<origin>.<pastTenseEvent>` convention:
//! `ext.wordSearched` rather than `ext.searchWord`. A topic announces
//! something that already happened, it does not issue a command.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::envelope::EnvelopeError;

/// Where a topic says its message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// `ext.*` - raised by extension-side code.
    Extension,
    /// `cscript.*` - raised by a content script.
    ContentScript,
    /// No recognised prefix.
    Unknown,
}

impl Origin {
    /// Topic prefix for extension-originated messages.
    pub const EXTENSION_PREFIX: &'static str = "ext";

    /// Topic prefix for content-script-originated messages.
    pub const CONTENT_SCRIPT_PREFIX: &'static str = "cscript";
}

/// A non-empty topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Create a topic, rejecting the empty string.
    pub fn new(name: impl Into<String>) -> Result<Self, EnvelopeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EnvelopeError::EmptyTopic);
        }
        Ok(Self(name))
    }

    /// Build `<origin>.<event>` for a known origin.
    ///
    /// Returns `None` for [`Origin::Unknown`] or an empty event name.
    #[must_use]
    pub fn namespaced(origin: Origin, event: &str) -> Option<Self> {
        let prefix = match origin {
            Origin::Extension => Origin::EXTENSION_PREFIX,
            Origin::ContentScript => Origin::CONTENT_SCRIPT_PREFIX,
            Origin::Unknown => return None,
        };
        if event.is_empty() {
            return None;
        }
        Some(Self(format!("{prefix}.{event}")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the topic by its namespace prefix.
    #[must_use]
    pub fn origin(&self) -> Origin {
        match self.0.split_once('.') {
            Some((Origin::EXTENSION_PREFIX, _)) => Origin::Extension,
            Some((Origin::CONTENT_SCRIPT_PREFIX, _)) => Origin::ContentScript,
            _ => Origin::Unknown,
        }
    }

    /// The part after the origin prefix, or the whole name when there is none.
    #[must_use]
    pub fn event(&self) -> &str {
        match self.origin() {
            Origin::Unknown => &self.0,
            _ => self.0.split_once('.').map_or(&self.0, |(_, event)| event),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Topic {
    type Error = EnvelopeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
