//! ChangeSets and Operations: the only way the engine mutates an itinerary.

use serde::{Deserialize, Serialize};

use super::node::Node;
use crate::error::{EngineError, Result};

/// A single mutation within a ChangeSet. Operations apply in list order;
/// the change engine never reorders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Insert `node` at `position` (0-based) within the changeset's target day.
    Insert { position: usize, node: Node },
    /// Replace the node at `id` wholesale, optionally overriding its timing.
    Replace {
        id: String,
        node: Node,
        #[serde(default)]
        start_time_override_epoch_millis: Option<i64>,
        #[serde(default)]
        end_time_override_epoch_millis: Option<i64>,
    },
    /// Patch named fields on the node at `id`, leaving the rest untouched.
    Update {
        id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        location: Option<super::node::Location>,
        #[serde(default)]
        timing: Option<super::node::Timing>,
        #[serde(default)]
        cost: Option<super::node::Cost>,
        #[serde(default)]
        details: Option<serde_json::Map<String, serde_json::Value>>,
        #[serde(default)]
        tips: Option<Vec<String>>,
        #[serde(default)]
        links: Option<Vec<String>>,
        #[serde(default)]
        locked: Option<bool>,
        #[serde(default)]
        booking_reference: Option<String>,
    },
    /// Remove the node at `id`.
    Delete { id: String },
    /// Relocate the node at `id` to `destination_day` at `destination_position`.
    Move {
        id: String,
        destination_day: u32,
        destination_position: usize,
    },
}

impl Operation {
    /// True when this operation is an explicit unlock (an `update` that sets
    /// `locked: false`) — the one kind of mutation §4.3 permits against a
    /// locked node.
    pub fn is_explicit_unlock(&self) -> bool {
        matches!(self, Operation::Update { locked: Some(false), .. })
    }

    /// The node identifier this operation targets, if any (insert has none).
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Operation::Insert { .. } => None,
            Operation::Replace { id, .. }
            | Operation::Update { id, .. }
            | Operation::Delete { id }
            | Operation::Move { id, .. } => Some(id),
        }
    }
}

/// Opaque, format-validated idempotency key (§6 Identifiers).
const IDEMPOTENCY_KEY_PATTERN: &str = r"^[A-Za-z0-9_-]{1,128}$";

/// A versioned bundle of operations targeting one itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub base_version: Option<u64>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub day: u32,
    pub ops: Vec<Operation>,
    pub reason: String,
    #[serde(default)]
    pub scope: Option<serde_json::Value>,
}

impl ChangeSet {
    /// Validates idempotency key format, if present. Called once up front by
    /// the change engine before any operation executes.
    pub fn validate_idempotency_key(&self) -> Result<()> {
        let Some(key) = &self.idempotency_key else {
            return Ok(());
        };
        let re = regex::Regex::new(IDEMPOTENCY_KEY_PATTERN).expect("static pattern is valid");
        if !re.is_match(key) {
            return Err(EngineError::InvalidInput(format!(
                "idempotency key '{key}' does not match the required format"
            )));
        }
        Ok(())
    }
}
