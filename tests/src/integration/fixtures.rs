//! Shared setup for the integration tests.

use std::time::Duration;

use ext_pubsub::{ContextHandle, Envelope, EnvelopeStream, InProcessHost, MessageBus, Payload, TabInfo};
use serde_json::Value;
use tokio::time::timeout;

pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// A context with its bus attached.
pub struct Attached {
    pub handle: ContextHandle,
    pub bus: MessageBus,
}

pub fn attach(handle: ContextHandle) -> Attached {
    let bus = MessageBus::attach(&handle);
    Attached { handle, bus }
}

/// Host with a background page, a popup and two tabs with content
/// scripts; the second tab is active.
pub struct Extension {
    pub host: InProcessHost,
    pub background: Attached,
    pub popup: Attached,
    pub tabs: Vec<(TabInfo, Attached)>,
}

impl Extension {
    pub fn open() -> Self {
        let host = InProcessHost::new();
        let background = attach(host.extension_context());
        let popup = attach(host.extension_context());
        let tabs = ["https://a.example", "https://b.example"]
            .iter()
            .map(|url| {
                let tab = host.open_tab(url);
                let script = attach(host.content_script(&tab));
                (tab, script)
            })
            .collect();
        Self {
            host,
            background,
            popup,
            tabs,
        }
    }

    pub fn tab(&self, index: usize) -> &(TabInfo, Attached) {
        &self.tabs[index]
    }
}

pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {other}"),
    }
}

pub async fn next(stream: &mut EnvelopeStream) -> Envelope {
    timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timeout")
        .expect("envelope")
}

/// Assert nothing arrives on `stream` for a short while.
pub async fn assert_quiet(stream: &mut EnvelopeStream) {
    tokio::time::sleep(QUIET_PERIOD).await;
    assert!(
        stream.try_recv().is_none(),
        "unexpected envelope on {}",
        stream.topic()
    );
}
