use crate::broker::BrokerHandle;
use crate::error::Error;
use crate::state::{VState, VStateData, VertexId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use tracing::{debug, error};

/// The fixed lifecycle graph. `failed` is a state without explicit edges:
/// it is where any failing action lands the machine.
const TRANSITIONS: [(VState, VState); 2] =
    [(VState::New, VState::Ready), (VState::Ready, VState::Done)];

const STATES: [VState; 4] = [VState::New, VState::Ready, VState::Done, VState::Failed];

pub type ActionFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// One-shot unit of work bound to a lifecycle edge. Receives the data
/// recorded for the state the machine is leaving.
pub type Action = Box<dyn FnOnce(Option<Value>) -> ActionFuture + Send + Sync>;

/// Drives one vertex through its lifecycle, reporting every transition to
/// the broker.
pub struct StateMachine {
    name: Option<String>,
    vertex: VertexId,
    state: VState,
    bindings: HashMap<(VState, VState), Action>,
    bound: HashSet<(VState, VState)>,
    data: HashMap<VState, Value>,
    broker: BrokerHandle,
}

impl StateMachine {
    pub fn new(name: Option<String>, vertex: VertexId, broker: BrokerHandle) -> Self {
        Self {
            name,
            vertex,
            state: VState::New,
            bindings: HashMap::new(),
            bound: HashSet::new(),
            data: HashMap::new(),
            broker,
        }
    }

    pub fn state(&self) -> VState {
        self.state
    }

    /// Bind an action to one of the lifecycle edges. Every edge must carry
    /// exactly one action before [`step`](Self::step) may run; rebinding an
    /// edge replaces the previous action.
    pub fn bind(&mut self, source: VState, target: VState, action: Action) -> Result<(), Error> {
        for state in [source, target] {
            if !STATES.contains(&state) {
                return Err(Error::WrongState(format!("unknown state {state}")));
            }
        }
        if !TRANSITIONS.contains(&(source, target)) {
            return Err(Error::WrongTransition(source, target));
        }
        self.bindings.insert((source, target), action);
        self.bound.insert((source, target));
        Ok(())
    }

    /// Transition to the next state.
    ///
    /// Runs the single outgoing edge's action; a failing action records the
    /// failure and forces the `failed` state instead of propagating. Either
    /// way the resulting snapshot is reported to the broker; a failed report
    /// forces `failed` and reports once more.
    ///
    /// Returns the data recorded for the new state, or `None` when the
    /// current state has no outgoing edges (terminal).
    pub async fn step(&mut self) -> Result<Option<Value>, Error> {
        self.assert_transitions_bound()?;

        let targets: Vec<VState> = TRANSITIONS
            .iter()
            .filter(|(source, _)| *source == self.state)
            .map(|(_, target)| *target)
            .collect();
        debug!(vertex = %self.vertex, candidates = targets.len(), "taking another step");
        let target = match targets.as_slice() {
            [] => return Ok(None),
            [target] => *target,
            _ => {
                return Err(Error::WrongState(format!(
                    "state {} has more than one adjacent state",
                    self.state
                )));
            }
        };

        // edges are bound before stepping and the graph is linear, so the
        // action for this edge can't have been consumed yet
        let action = self
            .bindings
            .remove(&(self.state, target))
            .ok_or_else(|| Error::WrongState(format!("no action left for {} -> {target}", self.state)))?;

        let input = self.data.get(&self.state).cloned();
        match action(input).await {
            Ok(value) => {
                self.data.insert(target, value);
                self.state = target;
                debug!(vertex = %self.vertex, state = %self.state, "moved");
            }
            Err(cause) => {
                error!(vertex = %self.vertex, %cause, "step failed");
                self.fail(format!("{cause:#}"));
            }
        }

        if let Err(cause) = self.report().await {
            self.fail(cause.to_string());
            self.report().await?;
        }
        Ok(self.data.get(&self.state).cloned())
    }

    /// Force the machine into `failed`, recording `cause` as its data.
    pub fn fail(&mut self, cause: String) {
        self.data.insert(VState::Failed, Value::String(cause));
        self.state = VState::Failed;
    }

    /// Report the current snapshot to the broker.
    pub async fn report(&self) -> Result<(), Error> {
        self.broker.update(self.vertex, self.state_data()).await
    }

    /// Snapshot of the machine's current state.
    pub fn state_data(&self) -> VStateData {
        VStateData::new(
            self.name.clone(),
            Some(self.vertex),
            self.state,
            self.data.get(&self.state).cloned(),
        )
    }

    fn assert_transitions_bound(&self) -> Result<(), Error> {
        let unbound: Vec<(VState, VState)> = TRANSITIONS
            .iter()
            .filter(|edge| !self.bound.contains(edge))
            .copied()
            .collect();
        if unbound.is_empty() {
            Ok(())
        } else {
            Err(Error::NotAllTransitionsBound(unbound))
        }
    }
}
