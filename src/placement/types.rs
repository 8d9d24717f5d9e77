use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Name of a storage node, as it appears in the cluster configuration.
///
/// The ring orders nodes by their position in the configuration, never by
/// name, so renaming a node does not move segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Up,
    Down,
}

/// Health record kept by the ring for every configured node.
///
/// `transitions` counts Up/Down flips and is only used for logging and the
/// gateway status output.
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub state: NodeState,
    pub changed_at: Instant,
    pub transitions: u64,
}

impl NodeHealth {
    pub fn up() -> Self {
        Self {
            state: NodeState::Up,
            changed_at: Instant::now(),
            transitions: 0,
        }
    }

    pub fn is_down(&self) -> bool {
        self.state == NodeState::Down
    }
}
