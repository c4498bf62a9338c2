//! # Pubsub Runtime
//!
//! Runs the word-lookup extension on the in-process host and logs what
//! every context observed.
//!
//! ## Contexts
//!
//! - `background`: looks words up, collects display confirmations
//! - `popup`: keeps a search history
//! - `tab-N`: one content script per tab; the active one selects words and
//!   shows definitions

use anyhow::{Context, Result};
use tracing::{info, warn};

use pubsub_runtime::{ExtensionRuntime, RuntimeConfig};
use pubsub_telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    pubsub_telemetry::init_telemetry(&TelemetryConfig::from_env())?;

    // Load configuration
    let config = RuntimeConfig::from_env().context("Invalid runtime configuration")?;
    let expected = config.words.len();

    let runtime = ExtensionRuntime::start(config);
    runtime.run_scenario().await;

    if !runtime
        .settle(|activity| activity.confirmed.len() >= expected)
        .await
    {
        warn!(
            settle = ?runtime.config().settle,
            "Not every definition was confirmed before the settle time"
        );
    }

    let activity = runtime.activity();
    info!(
        lookups = activity.lookups.len(),
        shown = activity.shown.len(),
        confirmed = activity.confirmed.len(),
        history = ?activity.popup_history,
        "Scenario finished"
    );
    for (context, stats) in runtime.stats() {
        info!(
            context = %context,
            published = stats.published,
            dispatched = stats.dispatched,
            dropped = stats.dropped,
            "Bus statistics"
        );
    }

    runtime.shutdown();
    Ok(())
}
