//! Append-only revision history enabling rollback.

use serde::{Deserialize, Serialize};

use super::changeset::ChangeSet;
use super::itinerary::Day;

/// One entry in an itinerary's revision history. `days` is a full snapshot
/// of the days *before* the change was applied, so `rollback` can restore
/// it verbatim without replaying operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub itinerary_id: String,
    pub revision_number: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub reason: String,
    pub changeset: ChangeSet,
    pub days_before: Vec<Day>,
}
