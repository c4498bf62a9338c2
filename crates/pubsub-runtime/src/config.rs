//! # Runtime Configuration
//!
//! Environment-driven settings for the demo extension.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one tab is required")]
    NoTabs,

    #[error("Active tab {active} is out of range (1..={tabs})")]
    ActiveTabOutOfRange { active: usize, tabs: usize },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Demo extension configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of tabs to open, each with one content script.
    pub tabs: usize,
    /// 1-based index of the tab that is active while the scenario runs.
    pub active_tab: usize,
    /// Words selected in the active tab, in order.
    pub words: Vec<String>,
    /// How long to wait for in-flight deliveries before reporting.
    pub settle: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tabs: 2,
            active_tab: 2,
            words: vec![
                "ferris".to_string(),
                "borrow".to_string(),
                "lifetime".to_string(),
            ],
            settle: Duration::from_millis(200),
        }
    }
}

impl RuntimeConfig {
    /// Load from the environment.
    ///
    /// - `PUBSUB_TABS`: number of tabs (default: 2)
    /// - `PUBSUB_ACTIVE_TAB`: active tab, 1-based (default: last tab)
    /// - `PUBSUB_WORDS`: comma-separated words (default: ferris,borrow,lifetime)
    /// - `PUBSUB_SETTLE_MS`: settle time in milliseconds (default: 200)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("PUBSUB_TABS") {
            config.tabs = parse("PUBSUB_TABS", &value)?;
            config.active_tab = config.tabs;
        }
        if let Some(value) = lookup("PUBSUB_ACTIVE_TAB") {
            config.active_tab = parse("PUBSUB_ACTIVE_TAB", &value)?;
        }
        if let Some(value) = lookup("PUBSUB_WORDS") {
            config.words = value
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("PUBSUB_SETTLE_MS") {
            config.settle = Duration::from_millis(parse("PUBSUB_SETTLE_MS", &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tabs == 0 {
            return Err(ConfigError::NoTabs);
        }
        if self.active_tab == 0 || self.active_tab > self.tabs {
            return Err(ConfigError::ActiveTabOutOfRange {
                active: self.active_tab,
                tabs: self.tabs,
            });
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
