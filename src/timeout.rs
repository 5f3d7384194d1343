use crate::error::Error;
use std::time::Duration;
use tokio::time;

/// Per-vertex timeout tiers.
///
/// `deps` bounds the dependency wait, `payload` bounds the payload run,
/// `global` bounds the whole lifecycle. `None` means no limit for that tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct VTimeout {
    pub global: Option<Duration>,
    pub deps: Option<Duration>,
    pub payload: Option<Duration>,
}

impl VTimeout {
    /// Build a tiered timeout, checking that the global tier covers the sum
    /// of the inner ones (missing tiers count as zero).
    pub fn new(
        global: Option<Duration>,
        deps: Option<Duration>,
        payload: Option<Duration>,
    ) -> Result<Self, Error> {
        if let Some(global) = global {
            let deps_d = deps.unwrap_or(Duration::ZERO);
            let payload_d = payload.unwrap_or(Duration::ZERO);
            if global < deps_d + payload_d {
                return Err(Error::InvalidTimeout {
                    global,
                    deps: deps_d,
                    payload: payload_d,
                });
            }
        }
        Ok(Self { global, deps, payload })
    }

    /// No limits at all.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Shortcut for "give the payload this much time", no other tiers.
impl From<Duration> for VTimeout {
    fn from(payload: Duration) -> Self {
        Self { global: None, deps: None, payload: Some(payload) }
    }
}

/// Race `work` against a deadline.
///
/// With no (or zero) limit the work runs unguarded. If the timer wins the
/// work future is dropped, which is a hard cancellation at its next await
/// point, and the caller gets [`Error::TimedOut`]; no partial result
/// survives. Otherwise the work's own result or error propagates untouched.
pub async fn guarded<T, F>(limit: Option<Duration>, work: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match limit {
        None => work.await,
        Some(limit) if limit.is_zero() => work.await,
        Some(limit) => match time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::TimedOut(limit).into()),
        },
    }
}
