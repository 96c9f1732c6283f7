//! The persistence contract to the document store collaborator.
//!
//! The document store itself (a NoSQL/document database) is out of scope —
//! it's an external collaborator. This module fixes only the interface the
//! rest of the engine calls through, plus an in-memory implementation used
//! by tests and as a reference for what "read-your-writes for a single
//! itinerary" means operationally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{EngineError, Result};
use crate::model::itinerary::Itinerary;
use crate::model::revision::Revision;

/// Metadata linking a user to one of their trips, persisted by
/// [`DocumentStore::save_user_trip`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTripLink {
    pub user_id: String,
    pub itinerary_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The persistence contract (§6). Implementations must provide
/// read-your-writes for a single itinerary: a `get_itinerary` issued after a
/// successful `put_itinerary` on the same identifier must observe that
/// write, even under concurrent access from other itineraries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_itinerary(&self, id: &str) -> Result<Option<Itinerary>>;

    /// Writes `itinerary` iff no newer version already exists for its id.
    /// Fails with [`EngineError::VersionConflict`] when the stored version
    /// is not exactly `itinerary.version - 1` (i.e. this is not the very
    /// next write), which is the store's half of the optimistic-concurrency
    /// contract — the change engine enforces the client-facing half.
    async fn put_itinerary(&self, itinerary: &Itinerary) -> Result<()>;

    async fn append_revision(&self, revision: &Revision) -> Result<()>;

    async fn list_revisions(&self, itinerary_id: &str) -> Result<Vec<Revision>>;

    async fn get_revision(&self, itinerary_id: &str, revision_number: u64) -> Result<Option<Revision>>;

    async fn save_user_trip(&self, link: UserTripLink) -> Result<()>;

    async fn delete_itinerary(&self, id: &str) -> Result<()>;
}

/// An in-memory [`DocumentStore`] for tests and local development. Not a
/// stand-in for production persistence — there is no durability here.
#[derive(Default)]
pub struct InMemoryStore {
    itineraries: RwLock<HashMap<String, Itinerary>>,
    revisions: RwLock<HashMap<String, Vec<Revision>>>,
    user_trips: RwLock<Vec<UserTripLink>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_itinerary(&self, id: &str) -> Result<Option<Itinerary>> {
        Ok(self.itineraries.read().get(id).cloned())
    }

    async fn put_itinerary(&self, itinerary: &Itinerary) -> Result<()> {
        let mut guard = self.itineraries.write();
        if let Some(existing) = guard.get(&itinerary.id) {
            if itinerary.version != existing.version && itinerary.version != existing.version + 1 {
                return Err(EngineError::VersionConflict {
                    current: existing.version,
                    requested: itinerary.version,
                });
            }
        }
        guard.insert(itinerary.id.clone(), itinerary.clone());
        Ok(())
    }

    async fn append_revision(&self, revision: &Revision) -> Result<()> {
        self.revisions
            .write()
            .entry(revision.itinerary_id.clone())
            .or_default()
            .push(revision.clone());
        Ok(())
    }

    async fn list_revisions(&self, itinerary_id: &str) -> Result<Vec<Revision>> {
        let mut revisions = self
            .revisions
            .read()
            .get(itinerary_id)
            .cloned()
            .unwrap_or_default();
        revisions.sort_by(|a, b| b.revision_number.cmp(&a.revision_number));
        Ok(revisions)
    }

    async fn get_revision(&self, itinerary_id: &str, revision_number: u64) -> Result<Option<Revision>> {
        Ok(self
            .revisions
            .read()
            .get(itinerary_id)
            .and_then(|revs| revs.iter().find(|r| r.revision_number == revision_number).cloned()))
    }

    async fn save_user_trip(&self, link: UserTripLink) -> Result<()> {
        self.user_trips.write().push(link);
        Ok(())
    }

    async fn delete_itinerary(&self, id: &str) -> Result<()> {
        self.itineraries.write().remove(id);
        self.revisions.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::itinerary::{BudgetTier, CreationStatus, Party, Settings, TripMetadata};
    use chrono::NaiveDate;

    fn sample(id: &str, version: u64) -> Itinerary {
        let now = chrono::Utc::now();
        Itinerary {
            id: id.to_string(),
            owner_id: "user_1".into(),
            version,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Draft,
            days: vec![],
            settings: Settings::default(),
            trip: TripMetadata {
                destination: "Warsaw".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(),
                inclusive: true,
                party: Party {
                    adults: 2,
                    children: 0,
                    rooms: 1,
                },
                budget_tier: BudgetTier::Mid,
                interests: vec![],
                language: None,
            },
        }
    }

    #[tokio::test]
    async fn read_your_writes_within_one_itinerary() {
        let store = InMemoryStore::new();
        store.put_itinerary(&sample("itin_1", 1)).await.unwrap();
        let got = store.get_itinerary("itin_1").await.unwrap().unwrap();
        assert_eq!(got.version, 1);
    }

    #[tokio::test]
    async fn stale_write_is_rejected() {
        let store = InMemoryStore::new();
        store.put_itinerary(&sample("itin_1", 1)).await.unwrap();
        store.put_itinerary(&sample("itin_1", 2)).await.unwrap();
        let err = store.put_itinerary(&sample("itin_1", 2)).await;
        assert!(matches!(err, Err(EngineError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn revisions_list_descending_by_number() {
        let store = InMemoryStore::new();
        let cs = crate::model::changeset::ChangeSet {
            base_version: Some(1),
            idempotency_key: None,
            day: 1,
            ops: vec![],
            reason: "r".into(),
            scope: None,
        };
        for n in 1..=3u64 {
            store
                .append_revision(&Revision {
                    itinerary_id: "itin_1".into(),
                    revision_number: n,
                    timestamp: chrono::Utc::now(),
                    reason: "r".into(),
                    changeset: cs.clone(),
                    days_before: vec![],
                })
                .await
                .unwrap();
        }
        let revs = store.list_revisions("itin_1").await.unwrap();
        assert_eq!(revs.iter().map(|r| r.revision_number).collect::<Vec<_>>(), vec![3, 2, 1]);
    }
}
