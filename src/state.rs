use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque identity of a vertex. Equality is identity-based; the human
/// readable name (if any) lives in [`VKey`] / [`VStateData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(Uuid);

impl VertexId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VertexId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to tell vertices apart in logs
        let s = self.0.simple().to_string();
        write!(f, "v{}", &s[..8])
    }
}

/// Lifecycle states of a vertex.
///
/// The lifecycle graph is linear (`new -> ready -> done`); `failed` has no
/// explicit edges and is reached when any transition action errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VState {
    New,
    Ready,
    Done,
    Failed,
}

impl VState {
    /// Final states: no further transitions leave them.
    pub fn is_terminal(self) -> bool {
        matches!(self, VState::Done | VState::Failed)
    }
}

impl fmt::Display for VState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VState::New => "new",
            VState::Ready => "ready",
            VState::Done => "done",
            VState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Key of a vertex's state data: a name, an identity, or both.
///
/// Dependencies may be declared by name before the named vertex even exists,
/// so a key with only a name must still be usable for lookups and compare
/// correctly against a key carrying both fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VKey {
    pub name: Option<String>,
    pub vertex: Option<VertexId>,
}

impl VKey {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), vertex: None }
    }

    pub fn by_vertex(vertex: VertexId) -> Self {
        Self { name: None, vertex: Some(vertex) }
    }

    pub fn new(name: Option<String>, vertex: Option<VertexId>) -> Self {
        debug_assert!(name.is_some() || vertex.is_some(), "key needs a name or a vertex");
        Self { name, vertex }
    }

    /// Partial equality: `Some(true)` when the keys share a non-empty name or
    /// a non-empty identity (name takes preference), `None` when there is no
    /// mutual populated field to compare on.
    pub fn same(&self, other: &VKey) -> Option<bool> {
        match (&self.name, &other.name) {
            (Some(a), Some(b)) => Some(a == b),
            _ => match (&self.vertex, &other.vertex) {
                (Some(a), Some(b)) => Some(a == b),
                _ => None,
            },
        }
    }

    /// `same` collapsed to a boolean; incomparable keys do not match.
    pub fn matches(&self, other: &VKey) -> bool {
        self.same(other) == Some(true)
    }
}

impl fmt::Display for VKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.vertex) {
            (Some(name), _) => f.write_str(name),
            (None, Some(vertex)) => write!(f, "{vertex}"),
            (None, None) => f.write_str("?"),
        }
    }
}

/// One vertex's latest state snapshot as produced by the state machine and
/// stored by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VStateData {
    pub name: Option<String>,
    pub vertex: Option<VertexId>,
    pub state: VState,
    /// Payload/transition result, or the captured failure rendered as a
    /// string; `None` before the first transition produced anything.
    pub data: Option<Value>,
}

impl VStateData {
    pub fn new(
        name: Option<String>,
        vertex: Option<VertexId>,
        state: VState,
        data: Option<Value>,
    ) -> Self {
        Self { name, vertex, state, data }
    }

    pub fn to_key(&self) -> VKey {
        VKey { name: self.name.clone(), vertex: self.vertex }
    }

    pub fn is_new(&self) -> bool {
        self.state == VState::New
    }

    pub fn is_ready(&self) -> bool {
        self.state == VState::Ready
    }

    pub fn is_done(&self) -> bool {
        self.state == VState::Done
    }

    pub fn is_failed(&self) -> bool {
        self.state == VState::Failed
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl fmt::Display for VStateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.vertex) {
            (Some(name), _) => write!(f, "{} ({})", name, self.state),
            (None, Some(vertex)) => write!(f, "{} ({})", vertex, self.state),
            (None, None) => write!(f, "? ({})", self.state),
        }
    }
}
