use crate::broker::BrokerHandle;
use crate::deps::{Dep, DependencyManager};
use crate::error::Error;
use crate::machine::StateMachine;
use crate::payload::{Payload, PayloadContext};
use crate::state::{VState, VStateData, VertexId};
use crate::timeout::{self, VTimeout};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// Pause between dependency state polls.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Handle to one vertex of the execution graph.
///
/// The vertex itself runs as an isolated tokio task and shares no state
/// with anyone: it talks to the broker and nothing else. The handle is
/// just identity plus control; current state lives in the broker's store.
#[derive(Debug)]
pub struct Vertex {
    id: VertexId,
    name: Option<String>,
    handle: JoinHandle<()>,
}

impl Vertex {
    pub fn builder(payload: Arc<dyn Payload>) -> VertexBuilder {
        VertexBuilder {
            payload,
            name: None,
            deps: Vec::new(),
            timeout: VTimeout::none(),
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Wait for the vertex task to terminate. Its outcome is observable
    /// only through the broker's store.
    pub async fn join(self) {
        let _ = self.handle.await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Vertex {}

pub struct VertexBuilder {
    payload: Arc<dyn Payload>,
    name: Option<String>,
    deps: Vec<Dep>,
    timeout: VTimeout,
}

impl VertexBuilder {
    /// Optional human-readable name; immutable after spawn, usable as a
    /// dependency reference by other vertices.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Vertices or names this vertex waits for before running its payload.
    pub fn depends_on<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dep>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Tiered timeout, or a plain duration for the payload tier.
    pub fn timeout(mut self, timeout: impl Into<VTimeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Validate and start the vertex; it runs on its own from here on.
    pub fn spawn(self, broker: &BrokerHandle) -> Result<Vertex, Error> {
        let arity = self.payload.arity();
        if arity > 1 {
            return Err(Error::IncorrectPayloadArity(arity));
        }

        let id = VertexId::new();
        let manager = DependencyManager::new(self.deps);
        info!(vertex = %id, name = ?self.name, "spawning vertex");
        let handle = tokio::spawn(lifecycle(
            id,
            self.name.clone(),
            self.payload,
            manager,
            self.timeout,
            broker.clone(),
        ));
        Ok(Vertex { id, name: self.name, handle })
    }
}

/// The whole life of one vertex, bounded by the `global` timeout tier.
/// Whatever escapes (a timeout included) must leave a `failed` snapshot
/// behind before the task ends.
async fn lifecycle(
    id: VertexId,
    name: Option<String>,
    payload: Arc<dyn Payload>,
    manager: DependencyManager,
    vtimeout: VTimeout,
    broker: BrokerHandle,
) {
    let mut machine = StateMachine::new(name, id, broker.clone());
    let result = timeout::guarded(
        vtimeout.global,
        run(&mut machine, id, payload, manager, vtimeout, &broker),
    )
    .await;

    if let Err(cause) = result {
        machine.fail(format!("{cause:#}"));
        if let Err(report_cause) = machine.report().await {
            warn!(vertex = %id, %report_cause, "can't report failure");
        }
    }
    debug!(vertex = %id, "shut down");
}

async fn run(
    machine: &mut StateMachine,
    id: VertexId,
    payload: Arc<dyn Payload>,
    mut manager: DependencyManager,
    vtimeout: VTimeout,
    broker: &BrokerHandle,
) -> anyhow::Result<()> {
    broker.update(id, machine.state_data()).await?;
    debug!(vertex = %id, "building vertex lifecycle");

    let deps_broker = broker.clone();
    let deps_timeout = vtimeout.deps;
    machine.bind(
        VState::New,
        VState::Ready,
        Box::new(move |_input| {
            Box::pin(async move {
                timeout::guarded(deps_timeout, async {
                    while !manager.is_satisfied() {
                        let batch = deps_broker
                            .get_state_data(id, Some(manager.deps().to_vec()))
                            .await?;
                        manager.deduct(batch)?;
                        if manager.is_satisfied() {
                            break;
                        }
                        time::sleep(POLL_INTERVAL).await;
                    }
                    Ok(serde_json::to_value(manager.into_data())?)
                })
                .await
            })
        }),
    )?;

    let payload_timeout = vtimeout.payload;
    let ctx = PayloadContext::new(id, broker.clone());
    machine.bind(
        VState::Ready,
        VState::Done,
        Box::new(move |input| {
            Box::pin(async move {
                let deps_data: Vec<VStateData> = match (payload.arity(), input) {
                    (0, _) | (_, None) => Vec::new(),
                    (_, Some(value)) => serde_json::from_value(value)?,
                };
                timeout::guarded(payload_timeout, payload.run(&ctx, deps_data)).await
            })
        }),
    )?;

    while machine.step().await?.is_some() {
        debug!(vertex = %id, "another step fades");
    }
    Ok(())
}
