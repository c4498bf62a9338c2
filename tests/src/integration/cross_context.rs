//! # Cross-Context Delivery
//!
//! ## Flows Tested
//!
//! 1. **Extension → extension + active tab**: one publish reaches other
//!    extension pages and the active tab's content script
//! 2. **Content script → extension**: delivery carries the sender tab id
//! 3. **Topic isolation and ordering** in the receiving context
//! 4. **Best effort**: missing tab, inactive tabs, panicking subscribers

use std::sync::Arc;

use ext_pubsub::{Delivery, Envelope, TabId, TransportError, TransportKind};
use parking_lot::Mutex;
use serde_json::json;

use super::fixtures::{assert_quiet, next, payload, Extension};

// =============================================================================
// EXTENSION → EVERYWHERE
// =============================================================================

#[tokio::test]
async fn test_extension_publish_reaches_popup_and_active_tab() {
    let ext = Extension::open();
    let mut popup = ext.popup.bus.stream("ext.wordSearched");
    let mut active = ext.tab(1).1.bus.stream("ext.wordSearched");
    let mut inactive = ext.tab(0).1.bus.stream("ext.wordSearched");

    let data = json!({ "word": "ferris", "meta": { "source": "selection", "n": [1, 2] } });
    let outcomes = ext
        .background
        .bus
        .publish("ext.wordSearched", payload(data.clone()))
        .settled()
        .await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result, Ok(Delivery::Broadcast));
    assert_eq!(outcomes[1].result, Ok(Delivery::Tab(ext.tab(1).0.id)));

    for envelope in [next(&mut popup).await, next(&mut active).await] {
        assert_eq!(envelope.topic(), Some("ext.wordSearched"));
        assert_eq!(envelope.payload(), payload(data.clone()));
        // Sent from an extension page, so no sender tab.
        assert_eq!(envelope.get("tabId"), Some(&json!("")));
        assert_eq!(envelope.tab_id(), None);
    }
    assert_quiet(&mut inactive).await;
}

#[tokio::test]
async fn test_publisher_does_not_hear_itself() {
    let ext = Extension::open();
    let mut own = ext.background.bus.stream("ext.pinged");

    ext.background.bus.publish("ext.pinged", None).settled().await;

    assert_quiet(&mut own).await;
}

// =============================================================================
// CONTENT SCRIPT → EXTENSION
// =============================================================================

#[tokio::test]
async fn test_content_script_publish_carries_tab_id() {
    let ext = Extension::open();
    let mut background = ext.background.bus.stream("cscript.wordSelected");
    let mut popup = ext.popup.bus.stream("cscript.wordSelected");
    let (tab, script) = ext.tab(0);

    let outcomes = script
        .bus
        .publish("cscript.wordSelected", payload(json!({ "word": "borrow" })))
        .settled()
        .await;
    // Content scripts cannot query tabs: only the extension transport runs.
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].transport, TransportKind::Extension);

    for envelope in [next(&mut background).await, next(&mut popup).await] {
        assert_eq!(envelope.tab_id(), Some(tab.id));
        assert_eq!(envelope.get("word"), Some(&json!("borrow")));
    }
}

#[tokio::test]
async fn test_content_scripts_do_not_hear_each_other() {
    let ext = Extension::open();
    let mut other = ext.tab(1).1.bus.stream("cscript.wordSelected");

    ext.tab(0)
        .1
        .bus
        .publish("cscript.wordSelected", None)
        .settled()
        .await;

    assert_quiet(&mut other).await;
}

// =============================================================================
// ROUTING
// =============================================================================

#[tokio::test]
async fn test_topics_are_isolated_across_contexts() {
    let ext = Extension::open();
    let mut a = ext.popup.bus.stream("ext.a");
    let mut b = ext.popup.bus.stream("ext.b");

    ext.background.bus.publish("ext.b", None).settled().await;

    assert_eq!(next(&mut b).await.topic(), Some("ext.b"));
    assert_quiet(&mut a).await;
}

#[tokio::test]
async fn test_receiving_subscribers_run_in_registration_order() {
    let ext = Extension::open();
    let order = Arc::new(Mutex::new(Vec::new()));
    for n in 0..4 {
        let order = order.clone();
        ext.popup
            .bus
            .subscribe("ext.counted", move |_: &Envelope| order.lock().push(n));
    }
    let mut done = ext.popup.bus.stream("ext.counted");

    ext.background.bus.publish("ext.counted", None).settled().await;
    next(&mut done).await;

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_reserved_key_in_payload_is_replaced() {
    let ext = Extension::open();
    let mut real = ext.popup.bus.stream("ext.real");
    let mut spoofed = ext.popup.bus.stream("ext.spoofed");

    ext.background
        .bus
        .publish("ext.real", payload(json!({ "_key_": "ext.spoofed", "x": 1 })))
        .settled()
        .await;

    let envelope = next(&mut real).await;
    assert_eq!(envelope.get("x"), Some(&json!(1)));
    assert_quiet(&mut spoofed).await;
}

// =============================================================================
// BEST EFFORT
// =============================================================================

#[tokio::test]
async fn test_no_active_tab_still_reaches_extension_pages() {
    let ext = Extension::open();
    ext.host.set_active_tab(None);
    let mut popup = ext.popup.bus.stream("ext.a");
    let mut script = ext.tab(1).1.bus.stream("ext.a");

    let outcomes = ext.background.bus.publish("ext.a", None).settled().await;
    assert_eq!(outcomes[1].result, Err(TransportError::NoActiveTab));

    next(&mut popup).await;
    assert_quiet(&mut script).await;
}

#[tokio::test]
async fn test_switching_tabs_moves_delivery() {
    let ext = Extension::open();
    let first: TabId = ext.tab(0).0.id;
    let mut first_stream = ext.tab(0).1.bus.stream("ext.a");
    let mut second_stream = ext.tab(1).1.bus.stream("ext.a");

    assert!(ext.host.set_active_tab(Some(first)));
    ext.background.bus.publish("ext.a", None).settled().await;

    next(&mut first_stream).await;
    assert_quiet(&mut second_stream).await;
}

#[tokio::test]
async fn test_closed_tab_reports_missing_receiver() {
    let ext = Extension::open();
    let (tab, script) = ext.tab(1);
    script.handle.close();

    let outcomes = ext.background.bus.publish("ext.a", None).settled().await;
    assert!(matches!(
        outcomes[1].result,
        Err(TransportError::Platform(ext_pubsub::PlatformError::NoReceiver(id))) if id == tab.id
    ));
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_stop_context() {
    let ext = Extension::open();
    ext.popup
        .bus
        .subscribe("ext.boom", |_: &Envelope| panic!("subscriber failure"));
    let mut after = ext.popup.bus.stream("ext.after");

    ext.background.bus.publish("ext.boom", None).settled().await;
    ext.background.bus.publish("ext.after", None).settled().await;

    assert_eq!(next(&mut after).await.topic(), Some("ext.after"));
}

#[tokio::test]
async fn test_unsubscribed_topic_counts_as_dropped() {
    let ext = Extension::open();
    let mut marker = ext.popup.bus.stream("ext.marker");

    ext.background.bus.publish("ext.ignored", None).settled().await;
    ext.background.bus.publish("ext.marker", None).settled().await;
    next(&mut marker).await;

    let stats = ext.popup.bus.stats();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.dispatched, 1);
}

#[tokio::test]
async fn test_stream_combinators_across_contexts() {
    use tokio_stream::StreamExt;

    let ext = Extension::open();
    let words = ext.popup.bus.stream("ext.wordSearched");

    for word in ["ferris", "borrow", "lifetime"] {
        ext.background
            .bus
            .publish("ext.wordSearched", payload(json!({ "word": word })))
            .settled()
            .await;
    }

    let collected: Vec<String> = tokio::time::timeout(
        super::fixtures::RECV_TIMEOUT,
        words
            .filter_map(|envelope| envelope.get("word").and_then(|w| w.as_str()).map(str::to_string))
            .take(3)
            .collect(),
    )
    .await
    .expect("timeout");
    assert_eq!(collected, vec!["ferris", "borrow", "lifetime"]);
}
