//! # Extension Runtime
//!
//! Wires a small word-lookup extension across contexts:
//!
//! ```text
//! content script (active tab)        background                 popup
//!   cscript.wordSelected ─────────►  look up definition
//!                                    ext.wordSearched ───────► history
//!   show definition ◄──────────────────────┘
//!   cscript.definitionShown ──────►  count confirmation
//! ```

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use ext_pubsub::{
    BusStats, ContextHandle, Envelope, InProcessHost, MessageBus, Payload, TabId, TabInfo,
};
use pubsub_telemetry::{log_event, log_message};

use crate::config::RuntimeConfig;

/// Topics used by the demo extension.
pub mod topics {
    /// A word was selected on a page.
    pub const WORD_SELECTED: &str = "cscript.wordSelected";
    /// The background page looked a word up.
    pub const WORD_SEARCHED: &str = "ext.wordSearched";
    /// A content script displayed a definition.
    pub const DEFINITION_SHOWN: &str = "cscript.definitionShown";
}

/// Everything the contexts observed, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    /// Words the background page looked up, with the requesting tab.
    pub lookups: Vec<(Option<TabId>, String)>,
    /// Words the popup added to its history.
    pub popup_history: Vec<String>,
    /// Definitions displayed, per tab.
    pub shown: Vec<(TabId, String)>,
    /// Display confirmations received by the background page.
    pub confirmed: Vec<(Option<TabId>, String)>,
}

/// One execution context and its bus.
struct Context {
    name: String,
    handle: ContextHandle,
    bus: MessageBus,
}

impl Context {
    fn attach(name: String, handle: ContextHandle) -> Self {
        let bus = MessageBus::attach(&handle);
        log_event!(debug, name, "Context attached", transports = ?bus.transports());
        Self { name, handle, bus }
    }
}

/// The demo extension running on an in-process host.
pub struct ExtensionRuntime {
    host: InProcessHost,
    background: Context,
    popup: Context,
    tabs: Vec<(TabInfo, Context)>,
    activity: Arc<Mutex<Activity>>,
    config: RuntimeConfig,
}

impl ExtensionRuntime {
    /// Open every context and register all subscriptions.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: RuntimeConfig) -> Self {
        info!(tabs = config.tabs, words = config.words.len(), "Starting extension runtime");

        let host = InProcessHost::new();
        let activity = Arc::new(Mutex::new(Activity::default()));

        let background = Context::attach("background".to_string(), host.extension_context());
        let popup = Context::attach("popup".to_string(), host.extension_context());

        let tabs: Vec<(TabInfo, Context)> = (1..=config.tabs)
            .map(|n| {
                let tab = host.open_tab(&format!("https://example.com/page/{n}"));
                let context = Context::attach(format!("tab-{}", tab.id), host.content_script(&tab));
                (tab, context)
            })
            .collect();

        match config.active_tab.checked_sub(1).and_then(|i| tabs.get(i)) {
            Some((tab, _)) => {
                host.set_active_tab(Some(tab.id));
            }
            None => warn!(active_tab = config.active_tab, "Active tab out of range"),
        }

        let runtime = Self {
            host,
            background,
            popup,
            tabs,
            activity,
            config,
        };
        runtime.wire_background();
        runtime.wire_popup();
        runtime.wire_content_scripts();
        runtime
    }

    fn wire_background(&self) {
        let bus = self.background.bus.downgrade();
        let activity = self.activity.clone();
        let name = self.background.name.clone();
        self.background
            .bus
            .subscribe(topics::WORD_SELECTED, move |envelope: &Envelope| {
                let Some(word) = word_of(envelope) else {
                    log_message!(warn, name, "Selection without word", topics::WORD_SELECTED);
                    return;
                };
                let requested_by = envelope.tab_id();
                activity.lock().lookups.push((requested_by, word.clone()));

                let mut payload = Payload::new();
                payload.insert("word".to_string(), Value::from(word.as_str()));
                payload.insert(
                    "definition".to_string(),
                    define(&word).map_or(Value::Null, Value::from),
                );
                payload.insert(
                    "requestedBy".to_string(),
                    requested_by.map_or(Value::Null, |tab| json!(tab.0)),
                );
                log_message!(debug, name, "Word looked up", topics::WORD_SEARCHED, word = %word);
                if let Some(bus) = bus.upgrade() {
                    bus.publish(topics::WORD_SEARCHED, payload);
                }
            });

        let activity = self.activity.clone();
        self.background
            .bus
            .subscribe(topics::DEFINITION_SHOWN, move |envelope: &Envelope| {
                if let Some(word) = word_of(envelope) {
                    activity.lock().confirmed.push((envelope.tab_id(), word));
                }
            });
    }

    fn wire_popup(&self) {
        let activity = self.activity.clone();
        self.popup
            .bus
            .subscribe(topics::WORD_SEARCHED, move |envelope: &Envelope| {
                if let Some(word) = word_of(envelope) {
                    activity.lock().popup_history.push(word);
                }
            });
    }

    fn wire_content_scripts(&self) {
        for (tab, context) in &self.tabs {
            let bus = context.bus.downgrade();
            let activity = self.activity.clone();
            let tab_id = tab.id;
            let name = context.name.clone();
            context
                .bus
                .subscribe(topics::WORD_SEARCHED, move |envelope: &Envelope| {
                    let Some(word) = word_of(envelope) else {
                        return;
                    };
                    let definition = envelope
                        .get("definition")
                        .and_then(Value::as_str)
                        .unwrap_or("(no definition)");
                    log_message!(info, name, "Definition shown", topics::WORD_SEARCHED, word = %word, definition);
                    activity.lock().shown.push((tab_id, word.clone()));

                    let mut payload = Payload::new();
                    payload.insert("word".to_string(), Value::from(word));
                    if let Some(bus) = bus.upgrade() {
                        bus.publish(topics::DEFINITION_SHOWN, payload);
                    }
                });
        }
    }

    /// Make the `index`-th tab (1-based) active. Returns `false` if out of range.
    pub fn activate_tab(&self, index: usize) -> bool {
        match index.checked_sub(1).and_then(|i| self.tabs.get(i)) {
            Some((tab, _)) => self.host.set_active_tab(Some(tab.id)),
            None => false,
        }
    }

    /// Select every configured word in the active tab.
    pub async fn run_scenario(&self) {
        let words = self.config.words.clone();
        for word in &words {
            self.select_word(word).await;
        }
    }

    /// Simulate the user selecting `word` in the active tab.
    ///
    /// Returns `false` when no tab is active or the active tab has no script.
    pub async fn select_word(&self, word: &str) -> bool {
        let Some(active) = self.host.active_tab() else {
            warn!(word, "No active tab, selection ignored");
            return false;
        };
        let Some((_, context)) = self.tabs.iter().find(|(tab, _)| tab.id == active.id) else {
            warn!(tab_id = %active.id, "Active tab has no content script");
            return false;
        };

        let mut payload = Payload::new();
        payload.insert("word".to_string(), Value::from(word));
        let outcomes = context.bus.publish(topics::WORD_SELECTED, payload).settled().await;
        debug!(context = %context.name, word, ?outcomes, "Selection published");
        true
    }

    /// Wait until `done` holds for the observed activity or the configured
    /// settle time passes. Returns whether `done` was reached.
    pub async fn settle(&self, done: impl Fn(&Activity) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.settle;
        loop {
            if done(&*self.activity.lock()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Snapshot of the observed activity.
    pub fn activity(&self) -> Activity {
        self.activity.lock().clone()
    }

    /// Bus counters per context.
    pub fn stats(&self) -> Vec<(String, BusStats)> {
        let mut stats = vec![
            (self.background.name.clone(), self.background.bus.stats()),
            (self.popup.name.clone(), self.popup.bus.stats()),
        ];
        stats.extend(
            self.tabs
                .iter()
                .map(|(_, context)| (context.name.clone(), context.bus.stats())),
        );
        stats
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Close every context.
    pub fn shutdown(&self) {
        info!("Shutting down extension runtime");
        for (_, context) in &self.tabs {
            context.handle.close();
        }
        self.popup.handle.close();
        self.background.handle.close();
    }
}

fn word_of(envelope: &Envelope) -> Option<String> {
    envelope
        .get("word")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Built-in dictionary.
fn define(word: &str) -> Option<&'static str> {
    match word.to_lowercase().as_str() {
        "ferris" => Some("The crab mascot of the Rust language"),
        "borrow" => Some("To take a reference to a value without taking ownership"),
        "lifetime" => Some("The region of code over which a reference is valid"),
        "crate" => Some("A compilation unit in Rust"),
        "trait" => Some("A set of methods a type can implement"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tabs: usize, active_tab: usize, words: &[&str]) -> RuntimeConfig {
        RuntimeConfig {
            tabs,
            active_tab,
            words: words.iter().map(|w| w.to_string()).collect(),
            settle: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_define() {
        assert!(define("Ferris").is_some());
        assert!(define("monad").is_none());
    }

    #[tokio::test]
    async fn test_scenario_reaches_every_context() {
        let runtime = ExtensionRuntime::start(config(2, 2, &["ferris", "borrow"]));
        runtime.run_scenario().await;

        assert!(runtime.settle(|a| a.confirmed.len() == 2 && a.popup_history.len() == 2).await);

        let activity = runtime.activity();
        assert_eq!(
            activity.lookups,
            vec![
                (Some(TabId(2)), "ferris".to_string()),
                (Some(TabId(2)), "borrow".to_string()),
            ]
        );
        let mut history = activity.popup_history.clone();
        history.sort();
        assert_eq!(history, vec!["borrow", "ferris"]);

        let mut shown = activity.shown.clone();
        shown.sort();
        assert_eq!(
            shown,
            vec![(TabId(2), "borrow".to_string()), (TabId(2), "ferris".to_string())]
        );
        assert!(activity
            .confirmed
            .iter()
            .all(|(tab, _)| *tab == Some(TabId(2))));
        runtime.shutdown();
    }

    #[tokio::test]
    async fn test_definitions_follow_active_tab() {
        let runtime = ExtensionRuntime::start(config(3, 3, &[]));
        assert!(runtime.activate_tab(1));
        assert!(runtime.select_word("crate").await);

        assert!(runtime.settle(|a| a.confirmed.len() == 1).await);
        assert_eq!(runtime.activity().shown, vec![(TabId(1), "crate".to_string())]);
        assert!(!runtime.activate_tab(4));
        assert!(!runtime.activate_tab(0));
    }

    #[tokio::test]
    async fn test_unknown_word_still_round_trips() {
        let runtime = ExtensionRuntime::start(config(1, 1, &["monad"]));
        runtime.run_scenario().await;

        assert!(runtime.settle(|a| a.confirmed.len() == 1).await);
        assert_eq!(runtime.activity().shown, vec![(TabId(1), "monad".to_string())]);
    }

    #[tokio::test]
    async fn test_buses_freed_after_runtime_dropped() {
        let runtime = ExtensionRuntime::start(config(2, 1, &[]));
        let mut buses = vec![runtime.background.bus.downgrade(), runtime.popup.bus.downgrade()];
        buses.extend(runtime.tabs.iter().map(|(_, context)| context.bus.downgrade()));
        assert!(buses.iter().all(|bus| bus.upgrade().is_some()));

        runtime.shutdown();
        drop(runtime);
        assert!(buses.iter().all(|bus| bus.upgrade().is_none()));
    }

    #[tokio::test]
    async fn test_stats_cover_every_context() {
        let runtime = ExtensionRuntime::start(config(2, 1, &["trait"]));
        runtime.run_scenario().await;
        assert!(runtime.settle(|a| a.confirmed.len() == 1).await);

        let stats = runtime.stats();
        let names: Vec<&str> = stats.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["background", "popup", "tab-1", "tab-2"]);

        let background = stats[0].1;
        assert_eq!(background.published, 1);
        assert_eq!(background.dispatched, 2);
    }
}
