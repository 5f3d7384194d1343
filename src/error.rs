use crate::state::VState;
use std::time::Duration;
use thiserror::Error;

/// Framework-level errors.
///
/// Payload code is free to fail with any `anyhow::Error`; those are captured
/// as `failed` snapshot data and never wrapped into this taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker replied with a value that does not match the request kind.
    #[error("reply does not match the request kind")]
    UnknownRequest,

    /// The request could not be delivered to the broker, or the reply
    /// channel was dropped before an answer arrived.
    #[error("can't reach the broker: {0}")]
    SendFailure(String),

    /// The broker failed to process a request; carries the rendered message
    /// of the original error, never the error itself.
    #[error("request processing failed: {message}")]
    RequestProcessingFailed { message: String },

    /// A snapshot tried to rebind a name to a different identity (or an
    /// identity to a different name) in the data store.
    #[error("data skew: {0}")]
    DataSkew(String),

    /// `global` tier is shorter than the sum of `deps` and `payload` tiers.
    #[error("global timeout ({global:?}) is less than deps ({deps:?}) + payload ({payload:?})")]
    InvalidTimeout {
        global: Duration,
        deps: Duration,
        payload: Duration,
    },

    /// Payloads may consume zero or one argument (the dependency data).
    #[error("payload arity is {0}, supported only 0 and 1")]
    IncorrectPayloadArity(usize),

    /// One or more dependencies ended up in the `failed` state.
    #[error("some deps failed: {0:?}")]
    DepsFailed(Vec<String>),

    /// The guarded work did not finish before its deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// State is not part of the lifecycle graph, or has an ambiguous set of
    /// outgoing transitions.
    #[error("wrong state: {0}")]
    WrongState(String),

    #[error("transition {0} -> {1} is not available")]
    WrongTransition(VState, VState),

    /// `step()` was called before every lifecycle edge got an action.
    #[error("transitions without a bound action: {0:?}")]
    NotAllTransitionsBound(Vec<(VState, VState)>),

    /// `wait_all` gave up before every known vertex reached a final state.
    #[error("not all vertices finished within {0:?}")]
    WaitTimedOut(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
