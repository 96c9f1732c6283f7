//! The Itinerary aggregate root and its Day children.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::node::Node;

/// Lifecycle status of an itinerary (§3 Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    Draft,
    Generating,
    Ready,
    Failed,
}

/// A directed edge between two nodes within the same day (e.g. "walk from
/// node A to node B"). Edges reference nodes by identifier, never by index,
/// so they survive renumbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// One day of the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub day_number: u32,
    pub date: NaiveDate,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Day-scoped settings override. See [`Itinerary::effective_currency`]
    /// for the node > day > itinerary precedence this participates in.
    #[serde(default)]
    pub settings: Option<Settings>,
}

impl Day {
    pub fn new(day_number: u32, date: NaiveDate) -> Self {
        Self {
            day_number,
            date,
            nodes: Vec::new(),
            edges: Vec::new(),
            notes: None,
            settings: None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

/// Party composition for a trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default = "default_rooms")]
    pub rooms: u32,
}

fn default_rooms() -> u32 {
    1
}

/// Budget tier for the whole trip (echoed per-node in [`super::node::Cost`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Economy,
    Mid,
    Luxury,
}

/// Trip-level metadata captured at creation time (§6 Create itinerary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripMetadata {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub inclusive: bool,
    pub party: Party,
    pub budget_tier: BudgetTier,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl TripMetadata {
    /// Number of days spanned, inclusive of both endpoints per the spec's
    /// `inclusive` flag.
    pub fn day_count(&self) -> i64 {
        let span = (self.end_date - self.start_date).num_days();
        if self.inclusive {
            span + 1
        } else {
            span
        }
        .max(0)
    }
}

/// Pacing preference used by the skeleton/enrichment workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    Relaxed,
    Balanced,
    Packed,
}

/// Settings that can be set at itinerary, day, or node scope. Precedence is
/// node > day > itinerary (resolved Open Question, see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub pacing: Option<Pacing>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency: Some("USD".to_string()),
            units: Some("metric".to_string()),
            pacing: Some(Pacing::Balanced),
        }
    }
}

/// The aggregate root: one user's trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: String,
    pub owner_id: String,
    pub version: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub status: CreationStatus,
    pub days: Vec<Day>,
    pub settings: Settings,
    pub trip: TripMetadata,
}

impl Itinerary {
    pub fn day(&self, day_number: u32) -> Option<&Day> {
        self.days.iter().find(|d| d.day_number == day_number)
    }

    pub fn day_mut(&mut self, day_number: u32) -> Option<&mut Day> {
        self.days.iter_mut().find(|d| d.day_number == day_number)
    }

    /// Looks up a node anywhere in the itinerary by its global identifier,
    /// returning the owning day number alongside it.
    pub fn find_node(&self, node_id: &str) -> Option<(u32, &Node)> {
        for day in &self.days {
            if let Some(n) = day.node(node_id) {
                return Some((day.day_number, n));
            }
        }
        None
    }

    /// Node-level currency if set, else day-level, else itinerary-level.
    /// This is the concrete resolution of the spec's open precedence
    /// question (node > day > itinerary), applied uniformly.
    pub fn effective_currency(&self, day_number: u32, node_id: &str) -> String {
        if let Some(day) = self.day(day_number) {
            if let Some(node) = day.node(node_id) {
                if let Some(cur) = node.cost.as_ref().and_then(|c| c.currency.clone()) {
                    return cur;
                }
            }
            if let Some(cur) = day.settings.as_ref().and_then(|s| s.currency.clone()) {
                return cur;
            }
        }
        self.settings
            .currency
            .clone()
            .unwrap_or_else(|| "USD".to_string())
    }

    /// Total count of nodes across all days, for quick sanity checks/tests.
    pub fn node_count(&self) -> usize {
        self.days.iter().map(|d| d.nodes.len()).sum()
    }

    /// Ownership check a transport adapter runs before accepting a mutating
    /// request, surfacing `not_owned` (§7) rather than leaking a
    /// different user's itinerary through a mismatched identifier.
    pub fn assert_owned_by(&self, user_id: &str) -> crate::error::Result<()> {
        if self.owner_id != user_id {
            return Err(crate::error::EngineError::NotOwned {
                user: user_id.to_string(),
                itinerary: self.id.clone(),
            });
        }
        Ok(())
    }
}
