//! The itinerary data model: Itinerary, Day, Node, ChangeSet, Diff, Revision,
//! and AgentEvent. Everything here is plain data — the behavior that mutates
//! it lives in [`crate::change_engine`], [`crate::identity`], and the
//! [`crate::worker`] modules.

pub mod changeset;
pub mod diff;
pub mod event;
pub mod itinerary;
pub mod node;
pub mod revision;

pub use changeset::{ChangeSet, Operation};
pub use diff::{Diff, NodeUpdate};
pub use event::{AgentEvent, EnhancementKind, Phase, WorkerKind};
pub use itinerary::{BudgetTier, CreationStatus, Day, Edge, Itinerary, Party, Pacing, Settings, TripMetadata};
pub use node::{Coordinates, Cost, CostTier, Location, Node, NodeType, Timing};
pub use revision::Revision;
