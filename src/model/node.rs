//! The Node tree: the unit of activity within a Day.
//!
//! A Node is a strict leaf — it never holds a pointer back into the
//! itinerary. Cross-references (e.g. an edit targeting "the node I
//! mentioned earlier") are always by identifier string, resolved through the
//! [`crate::identity`] module, never by shared reference. This keeps the
//! Day -> Node -> Location shape a tree with no cycles, which is what lets
//! the change engine deep-copy at `apply` boundaries without aliasing bugs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The kind of activity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Attraction,
    Meal,
    Hotel,
    Transit,
    Activity,
}

/// Geographic coordinates. Always both-present or both-absent — see
/// [`Location`] — so map-rendering code never has to handle the
/// independent-nullable-float case that caused rendering bugs upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Validates the WGS84 bounds invariant from the spec (§3, §8.10).
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(EngineError::InvalidInput(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(EngineError::InvalidInput(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Where a node takes place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
}

impl Location {
    pub fn validate(&self) -> Result<()> {
        if let Some(c) = &self.coordinates {
            c.validate()?;
        }
        Ok(())
    }
}

/// When a node happens. `start`/`end` are epoch-millis; both optional
/// independently of each other, but when both are present, start <= end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timing {
    #[serde(default)]
    pub start_epoch_millis: Option<i64>,
    #[serde(default)]
    pub end_epoch_millis: Option<i64>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl Timing {
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_epoch_millis, self.end_epoch_millis) {
            if start > end {
                return Err(EngineError::InvalidInput(format!(
                    "timing start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }
}

/// Budget tier a node's cost was priced against (mirrors
/// [`crate::model::itinerary::BudgetTier`] at node scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Economy,
    Mid,
    Luxury,
}

/// What a node costs. Currency precedence (node overrides itinerary) is
/// resolved in [`crate::model::itinerary::Itinerary::effective_currency`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Cost {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub per_person: bool,
    #[serde(default)]
    pub tier: Option<CostTier>,
}

/// A unit of activity within a day.
///
/// `id` always matches `day{N}_node{M}` once [`crate::identity`] has run
/// migration; consumers must not assume this before calling
/// `migrate_if_needed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub cost: Option<Cost>,
    /// Type-specific free-form attributes (e.g. cuisine for a meal node).
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub booking_reference: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, title: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            node_type: Some(node_type),
            ..Default::default()
        }
    }

    /// Runs the per-node structural invariants (§3, §8.10). Does not check
    /// identifier shape or day-scoped uniqueness — that's
    /// [`crate::identity::validate_consistency`]'s job since it needs the
    /// surrounding itinerary for context.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "node {} has a blank title",
                self.id
            )));
        }
        if let Some(loc) = &self.location {
            loc.validate()?;
        }
        self.timing.validate()?;
        Ok(())
    }

    pub fn has_coordinates(&self) -> bool {
        self.location
            .as_ref()
            .map(|l| l.coordinates.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_out_of_range_lat() {
        let c = Coordinates { lat: 91.0, lng: 0.0 };
        assert!(c.validate().is_err());
    }

    #[test]
    fn coordinates_accept_boundary_values() {
        let c = Coordinates {
            lat: -90.0,
            lng: 180.0,
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn timing_rejects_start_after_end() {
        let t = Timing {
            start_epoch_millis: Some(200),
            end_epoch_millis: Some(100),
            duration_minutes: None,
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn node_with_blank_title_is_invalid() {
        let node = Node::new("day1_node1", "   ", NodeType::Attraction);
        assert!(node.validate().is_err());
    }

    #[test]
    fn node_without_coordinates_reports_false() {
        let node = Node::new("day1_node1", "Museum", NodeType::Attraction);
        assert!(!node.has_coordinates());
    }
}
