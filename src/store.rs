use crate::error::Error;
use crate::state::{VKey, VStateData, VertexId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Dual-indexed table of the latest state snapshot per vertex.
///
/// Snapshots are reachable by name and by identity so that dependencies
/// declared by name resolve before the named vertex's identity is known.
/// The broker loop is the only writer; readers (`wait_all`, renderers) go
/// through the lock-free read side of the maps.
#[derive(Debug, Default)]
pub struct DataStore {
    by_name: DashMap<String, VStateData>,
    by_vertex: DashMap<VertexId, VStateData>,
    size: AtomicUsize,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the snapshot for one vertex.
    ///
    /// Once a name is bound to an identity neither side may rebind: a later
    /// snapshot carrying the same name but a different identity (or vice
    /// versa) is a consistency violation and fails with [`Error::DataSkew`].
    /// Re-inserting the same logical vertex does not grow the element count.
    pub fn put(&self, new: VStateData) -> Result<(), Error> {
        if let Some(name) = &new.name {
            if let Some(known) = self.by_name.get(name) {
                if known.vertex != new.vertex {
                    return Err(Error::DataSkew(format!(
                        "vertex named {:?} - {:?} is recorded as {:?} in state",
                        name, new.vertex, known.vertex
                    )));
                }
            }
        }
        if let Some(vertex) = &new.vertex {
            if let Some(known) = self.by_vertex.get(vertex) {
                if known.name != new.name {
                    return Err(Error::DataSkew(format!(
                        "vertex {} named {:?} is already named {:?}",
                        vertex, new.name, known.name
                    )));
                }
            }
        }

        if !self.contains(&new.to_key()) {
            self.size.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(name) = new.name.clone() {
            self.by_name.insert(name, new.clone());
        }
        if let Some(vertex) = new.vertex {
            self.by_vertex.insert(vertex, new);
        }
        Ok(())
    }

    /// Look up a snapshot by key; the name index takes preference when the
    /// key carries both fields.
    pub fn get(&self, key: &VKey) -> Option<VStateData> {
        if let Some(name) = &key.name {
            if let Some(found) = self.by_name.get(name) {
                return Some(found.clone());
            }
        }
        key.vertex
            .and_then(|vertex| self.by_vertex.get(&vertex).map(|found| found.clone()))
    }

    pub fn get_by_vertex(&self, vertex: VertexId) -> Option<VStateData> {
        self.by_vertex.get(&vertex).map(|found| found.clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<VStateData> {
        self.by_name.get(name).map(|found| found.clone())
    }

    pub fn contains(&self, key: &VKey) -> bool {
        key.name.as_deref().is_some_and(|name| self.by_name.contains_key(name))
            || key.vertex.is_some_and(|vertex| self.by_vertex.contains_key(&vertex))
    }

    pub fn is_empty(&self) -> bool {
        self.size.load(Ordering::SeqCst) == 0
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// De-duplicated union of both indices. Could carry a lot of data on a
    /// large graph; prefer point lookups where possible.
    pub fn all(&self) -> Vec<VStateData> {
        let mut out: Vec<VStateData> = Vec::with_capacity(self.len());
        for entry in self.by_name.iter() {
            out.push(entry.value().clone());
        }
        for entry in self.by_vertex.iter() {
            // named snapshots are already in via the name index
            if entry.value().name.is_none() {
                out.push(entry.value().clone());
            }
        }
        out
    }
}
