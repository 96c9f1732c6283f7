//! The Diff shape produced by the change engine and consumed by patch events.

use serde::{Deserialize, Serialize};

use super::node::Node;

/// A before/after pair for an updated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub before: Node,
    pub after: Node,
}

/// Added / removed / updated summary of one `apply` or `propose` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub added: Vec<Node>,
    #[serde(default)]
    pub removed: Vec<Node>,
    #[serde(default)]
    pub updated: Vec<NodeUpdate>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}
