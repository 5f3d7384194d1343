use crate::state::{VKey, VState, VertexId};
use crate::store::DataStore;
use petgraph::graphmap::DiGraphMap;
use std::collections::{HashMap, HashSet};

/// Observed dependency graph of a run.
///
/// Vertices can be spawned in any order and at runtime, so no caller is
/// guaranteed to know the full graph; the broker is the only place every
/// vertex talks to, and this tracker is fed from its traffic. The picture
/// is therefore only as complete as the traffic observed so far: enabling
/// tracking after some vertices already finished yields partial answers,
/// including from [`root_cause`](Self::root_cause).
#[derive(Debug, Default)]
pub struct VTracker {
    graph: DiGraphMap<VertexId, ()>,
    by_state: HashMap<VState, HashSet<VertexId>>,
}

impl VTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vertex and the dependencies it asked about.
    ///
    /// Dependency keys that the store can't resolve yet are left dangling;
    /// they get their edge once a later observation finds them resolvable.
    pub fn track(&mut self, vertex: VertexId, deps: &[VKey], store: &DataStore) {
        self.graph.add_node(vertex);
        if let Some(data) = store.get_by_vertex(vertex) {
            self.cache_state(vertex, data.state);
        }

        for dep in deps {
            // the dep may be known by name only, so resolve through the store
            let Some(dep_data) = store.get(dep) else { continue };
            let Some(dep_vertex) = dep_data.vertex else { continue };
            self.cache_state(dep_vertex, dep_data.state);
            self.graph.add_edge(vertex, dep_vertex, ());
        }
    }

    /// All known dependencies of a vertex.
    pub fn deps_of(&self, vertex: VertexId) -> Vec<VertexId> {
        if !self.graph.contains_node(vertex) {
            return Vec::new();
        }
        self.graph
            .neighbors_directed(vertex, petgraph::Direction::Outgoing)
            .collect()
    }

    /// The observed dependency edges (vertex -> dependency).
    pub fn graph(&self) -> &DiGraphMap<VertexId, ()> {
        &self.graph
    }

    /// Identities grouped by their last observed state.
    pub fn by_state(&self) -> &HashMap<VState, HashSet<VertexId>> {
        &self.by_state
    }

    /// Failed vertices none of whose tracked dependencies failed: the
    /// originating failures of a cascade.
    pub fn root_cause(&self) -> Vec<VertexId> {
        let Some(failed) = self.by_state.get(&VState::Failed) else {
            return Vec::new();
        };
        failed
            .iter()
            .filter(|vertex| {
                !self
                    .deps_of(**vertex)
                    .iter()
                    .any(|dep| failed.contains(dep))
            })
            .copied()
            .collect()
    }

    /// Move a vertex into the bucket of its latest state, dropping it from
    /// any previous one.
    fn cache_state(&mut self, vertex: VertexId, state: VState) {
        for bucket in self.by_state.values_mut() {
            bucket.remove(&vertex);
        }
        self.by_state.entry(state).or_default().insert(vertex);
    }
}
