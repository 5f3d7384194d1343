//! Logging bootstrap built on `tracing` + `tracing-subscriber`.
//!
//! Level resolution: explicit argument, then the `EXDAG_LOG` environment
//! variable, then `info`. The mute switch drops every event at the filter
//! so a renderer can take over the terminal without log lines tearing it.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing_subscriber::filter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static MUTED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. Call once at startup; a second call
/// fails because the global dispatcher is already set.
pub fn init(level: Option<Level>) -> anyhow::Result<()> {
    let level = match level {
        Some(level) => level,
        None => std::env::var("EXDAG_LOG")
            .ok()
            .and_then(|raw| parse_level(&raw))
            .unwrap_or(Level::INFO),
    };

    let enabled = filter::filter_fn(move |meta| {
        !MUTED.load(Ordering::Relaxed) && *meta.level() <= level
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true).with_filter(enabled))
        .try_init()?;
    Ok(())
}

/// Ignore all log events until [`unmute`].
pub fn mute() {
    MUTED.store(true, Ordering::Relaxed);
}

pub fn unmute() {
    MUTED.store(false, Ordering::Relaxed);
}

fn parse_level(raw: &str) -> Option<Level> {
    match raw.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
