use crate::error::Error;
use crate::state::{VKey, VStateData, VertexId};
use tracing::{debug, warn};

/// A dependency as declared by the caller: either an already-spawned vertex
/// or the name of one that may not exist yet.
#[derive(Debug, Clone)]
pub enum Dep {
    Name(String),
    Vertex(VertexId),
}

impl From<&str> for Dep {
    fn from(name: &str) -> Self {
        Dep::Name(name.to_string())
    }
}

impl From<String> for Dep {
    fn from(name: String) -> Self {
        Dep::Name(name)
    }
}

impl From<VertexId> for Dep {
    fn from(vertex: VertexId) -> Self {
        Dep::Vertex(vertex)
    }
}

impl From<&crate::vertex::Vertex> for Dep {
    fn from(vertex: &crate::vertex::Vertex) -> Self {
        Dep::Vertex(vertex.id())
    }
}

/// Tracks the outstanding dependencies of one vertex and accumulates the
/// results of those that finished.
#[derive(Debug, Default)]
pub struct DependencyManager {
    deps: Vec<VKey>,
    data: Vec<VStateData>,
}

impl DependencyManager {
    pub fn new(deps: Vec<Dep>) -> Self {
        let deps = deps
            .into_iter()
            .map(|raw| match raw {
                Dep::Name(name) => VKey::by_name(name),
                Dep::Vertex(vertex) => VKey::by_vertex(vertex),
            })
            .collect();
        Self { deps, data: Vec::new() }
    }

    /// Keys still waiting to be resolved.
    pub fn deps(&self) -> &[VKey] {
        &self.deps
    }

    pub fn is_satisfied(&self) -> bool {
        self.deps.is_empty()
    }

    /// Results of all dependencies resolved so far, in resolution order.
    pub fn data(&self) -> &[VStateData] {
        &self.data
    }

    pub fn into_data(self) -> Vec<VStateData> {
        self.data
    }

    /// Reduce the outstanding set with a fresh batch of snapshots.
    ///
    /// Snapshots that don't belong to this manager are logged and discarded.
    /// Any `failed` snapshot among the remaining ones aborts the wait right
    /// away: dependency failure is not recoverable for the dependent vertex.
    /// `done` snapshots are accumulated and their keys removed; the set only
    /// ever shrinks.
    pub fn deduct(&mut self, batch: Vec<VStateData>) -> Result<(), Error> {
        let batch = self.filter_foreign(batch);
        debug!(count = batch.len(), "received deps");

        let failed: Vec<String> = batch
            .iter()
            .filter(|state| state.is_failed())
            .map(|state| state.to_string())
            .collect();
        if !failed.is_empty() {
            return Err(Error::DepsFailed(failed));
        }

        let done: Vec<VStateData> = batch.into_iter().filter(VStateData::is_done).collect();
        self.deps
            .retain(|dep| !done.iter().any(|state| state.to_key().matches(dep)));
        debug!(left = self.deps.len(), "deps deducted");
        self.data.extend(done);
        Ok(())
    }

    fn filter_foreign(&self, batch: Vec<VStateData>) -> Vec<VStateData> {
        let (own, foreign): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|state| self.deps.iter().any(|dep| state.to_key().matches(dep)));
        if !foreign.is_empty() {
            warn!(count = foreign.len(), "non-deps state received, filtering");
        }
        own
    }
}
