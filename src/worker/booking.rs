//! Booking worker: produces a booking reference; never mutates structure
//! (§4.2 "booking" / book). Chat-enabled; the only field it ever sets via
//! its ChangeSet is `booking_reference`.

use async_trait::async_trait;

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::{EngineError, Result};
use crate::model::changeset::{ChangeSet, Operation};
use crate::model::event::WorkerKind;
use crate::model::itinerary::Itinerary;

const TASK_TYPE: &str = "book";

/// The external booking/payment API is out of scope (§1); this worker only
/// mints the opaque reference the rest of the flow threads through.
fn mint_booking_reference() -> String {
    format!("book_{}", uuid::Uuid::new_v4())
}

pub struct BookingWorker;

#[async_trait]
impl Worker for BookingWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Booking,
            priority: 0,
            chat_enabled: true,
            produces_changeset: true,
        }
    }

    async fn execute(
        &self,
        itinerary: &Itinerary,
        request: &WorkerRequest,
        _execution_id: &str,
    ) -> Result<WorkerOutput> {
        let node_id = request
            .node_id
            .clone()
            .ok_or_else(|| EngineError::InvalidInput("booking worker requires request.node_id".to_string()))?;
        let (day_number, _) = itinerary
            .find_node(&node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.clone()))?;

        Ok(WorkerOutput::Changeset(ChangeSet {
            base_version: Some(itinerary.version),
            idempotency_key: None,
            day: day_number,
            ops: vec![Operation::Update {
                id: node_id,
                title: None,
                location: None,
                timing: None,
                cost: None,
                details: None,
                tips: None,
                links: None,
                locked: None,
                booking_reference: Some(mint_booking_reference()),
            }],
            reason: "booking confirmed".to_string(),
            scope: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::itinerary::{BudgetTier, CreationStatus, Day, Party, Settings, TripMetadata};
    use crate::model::node::{Node, NodeType};
    use chrono::NaiveDate;

    fn itinerary_with_node() -> Itinerary {
        let now = chrono::Utc::now();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("day1_node1", "Hotel", NodeType::Hotel));
        Itinerary {
            id: "itin_1".into(),
            owner_id: "user_1".into(),
            version: 3,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Ready,
            days: vec![day],
            settings: Settings::default(),
            trip: TripMetadata {
                destination: "Warsaw".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
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
    async fn only_sets_booking_reference() {
        let itin = itinerary_with_node();
        let worker = BookingWorker;
        let request = WorkerRequest {
            node_id: Some("day1_node1".to_string()),
            ..Default::default()
        };
        let output = worker.execute(&itin, &request, "exec_1").await.unwrap();
        let WorkerOutput::Changeset(cs) = output else {
            panic!("expected changeset output");
        };
        match &cs.ops[0] {
            Operation::Update {
                title,
                location,
                booking_reference,
                ..
            } => {
                assert!(title.is_none());
                assert!(location.is_none());
                assert!(booking_reference.is_some());
            }
            _ => panic!("expected an update op"),
        }
    }

    #[tokio::test]
    async fn missing_node_id_is_invalid_input() {
        let itin = itinerary_with_node();
        let worker = BookingWorker;
        let result = worker.execute(&itin, &WorkerRequest::default(), "exec_1").await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }
}
