//! exdag — execute an acyclic directed graph of tasks.
//!
//! Every vertex of the graph is an isolated tokio task wrapping a
//! [`Payload`]; vertices share no memory and talk only to the [`Broker`],
//! a single serialized loop that owns the [`DataStore`] of state snapshots
//! (and the optional [`VTracker`]). Dependencies are declared by vertex
//! handle or by name and resolved by polling the broker; payloads may
//! spawn further vertices at runtime, so the graph is discovered as it
//! executes.
//!
//! ```no_run
//! use exdag::{Broker, Vertex, payload};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() -> anyhow::Result<()> {
//! let mut broker = Broker::new();
//! let handle = broker.start(false);
//!
//! let first = Vertex::builder(payload::from_fn(|| Ok(json!(1))))
//!     .name("first")
//!     .spawn(&handle)?;
//! Vertex::builder(payload::from_fn_with_deps(|deps| Ok(json!(deps.len()))))
//!     .depends_on([&first])
//!     .spawn(&handle)?;
//!
//! broker
//!     .wait_all(Some(Duration::from_secs(10)), Duration::from_millis(100))
//!     .await??;
//! broker.teardown();
//! # Ok(()) }
//! ```

pub mod broker;
pub mod deps;
pub mod error;
pub mod logging;
pub mod machine;
pub mod payload;
pub mod state;
pub mod store;
pub mod timeout;
pub mod tracker;
pub mod vertex;

pub use broker::{Broker, BrokerHandle, Request, Response};
pub use deps::{Dep, DependencyManager};
pub use error::Error;
pub use machine::StateMachine;
pub use payload::{Payload, PayloadContext};
pub use state::{VKey, VState, VStateData, VertexId};
pub use store::DataStore;
pub use timeout::VTimeout;
pub use tracker::VTracker;
pub use vertex::Vertex;
