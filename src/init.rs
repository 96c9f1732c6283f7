//! Initialization Service: synchronously mints the skeleton record and
//! ownership link for a new itinerary (§4.7).
//!
//! This is the one synchronous step in an otherwise asynchronous creation
//! flow: the caller gets an identifier and an empty shell back before the
//! pipeline runs, so it can open its event subscription against a known
//! identifier before generation emits its first event. That ordering is the
//! whole point — see the rationale note in §4.7.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Result;
use crate::model::itinerary::{BudgetTier, CreationStatus, Day, Itinerary, Party, Settings, TripMetadata};
use crate::store::{DocumentStore, UserTripLink};

/// The create-itinerary request carried at the external interface (§6).
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CreateRequest {
    pub destination: String,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    #[serde(default = "default_inclusive")]
    pub inclusive: bool,
    pub party: Party,
    pub budget_tier: BudgetTier,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_inclusive() -> bool {
    true
}

/// Creates the skeleton record and ownership link synchronously, then
/// returns the shell for the caller to hand back in its API response
/// (§4.7, §6 "Create itinerary").
pub struct InitializationService {
    store: Arc<dyn DocumentStore>,
}

impl InitializationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Mints an identifier, builds an empty day-shell spanning the request's
    /// date range, persists it, links ownership, and returns the shell. The
    /// returned itinerary carries `CreationStatus::Generating` — the
    /// Pipeline Orchestrator is expected to run immediately after this
    /// returns, so the shell is never observed sitting idle in `Draft`.
    pub async fn create(&self, request: CreateRequest, owner_id: &str) -> Result<Itinerary> {
        let id = format!("itin_{}", Ulid::new());
        let now = chrono::Utc::now();

        let day_count = TripMetadata {
            destination: request.destination.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            inclusive: request.inclusive,
            party: request.party,
            budget_tier: request.budget_tier,
            interests: request.interests.clone(),
            language: request.language.clone(),
        }
        .day_count();

        let days = (1..=day_count.max(0) as u32)
            .map(|n| Day::new(n, request.start_date + chrono::Duration::days((n - 1) as i64)))
            .collect();

        let shell = Itinerary {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Generating,
            days,
            settings: Settings::default(),
            trip: TripMetadata {
                destination: request.destination,
                start_date: request.start_date,
                end_date: request.end_date,
                inclusive: request.inclusive,
                party: request.party,
                budget_tier: request.budget_tier,
                interests: request.interests,
                language: request.language,
            },
        };

        self.store.put_itinerary(&shell).await?;
        self.store
            .save_user_trip(UserTripLink {
                user_id: owner_id.to_string(),
                itinerary_id: id,
                created_at: now,
            })
            .await?;

        Ok(shell)
    }
}
