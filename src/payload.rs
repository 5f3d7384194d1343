use crate::broker::BrokerHandle;
use crate::error::Error;
use crate::state::{VStateData, VertexId};
use crate::vertex::Vertex;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Unit of work executed by a vertex.
///
/// The framework takes care of error processing: `run` may fail with any
/// domain error, there is no need to mask or wrap it — the failure ends up
/// as the vertex's `failed` snapshot data.
#[async_trait]
pub trait Payload: Send + Sync + 'static {
    /// How many arguments the body consumes: 0 ignores dependency data,
    /// 1 receives the resolved dependency snapshots. Anything else fails
    /// vertex construction.
    fn arity(&self) -> usize {
        1
    }

    /// Run the body. `deps` holds the dependency results in resolution
    /// order; it is empty for arity-0 payloads.
    async fn run(&self, ctx: &PayloadContext, deps: Vec<VStateData>) -> anyhow::Result<Value>;
}

/// Execution context handed to a payload: its own identity plus a channel
/// to the broker for spawning follow-up vertices.
#[derive(Clone)]
pub struct PayloadContext {
    vertex: VertexId,
    broker: BrokerHandle,
}

impl PayloadContext {
    pub(crate) fn new(vertex: VertexId, broker: BrokerHandle) -> Self {
        Self { vertex, broker }
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn broker(&self) -> &BrokerHandle {
        &self.broker
    }

    /// Spawn a new vertex through the broker; its sole dependency is the
    /// calling vertex. This is how the graph grows at runtime.
    pub async fn spawn(&self, payload: Arc<dyn Payload>) -> Result<Vertex, Error> {
        self.broker.add_vertex(self.vertex, payload).await
    }
}

/// Adapter for a plain zero-argument closure.
pub struct FnPayload<F> {
    body: F,
}

#[async_trait]
impl<F> Payload for FnPayload<F>
where
    F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn arity(&self) -> usize {
        0
    }

    async fn run(&self, _ctx: &PayloadContext, _deps: Vec<VStateData>) -> anyhow::Result<Value> {
        (self.body)()
    }
}

/// Adapter for a closure consuming the dependency data.
pub struct FnPayloadWithDeps<F> {
    body: F,
}

#[async_trait]
impl<F> Payload for FnPayloadWithDeps<F>
where
    F: Fn(Vec<VStateData>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    async fn run(&self, _ctx: &PayloadContext, deps: Vec<VStateData>) -> anyhow::Result<Value> {
        (self.body)(deps)
    }
}

pub fn from_fn<F>(body: F) -> Arc<dyn Payload>
where
    F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnPayload { body })
}

pub fn from_fn_with_deps<F>(body: F) -> Arc<dyn Payload>
where
    F: Fn(Vec<VStateData>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnPayloadWithDeps { body })
}
