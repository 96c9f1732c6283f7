//! Skeleton worker: produces the per-day structure of placeholder Nodes
//! (§4.2 "skeleton"). Title, type and slot time only — population workers
//! fill in everything else.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::{EngineError, Result};
use crate::llm::{generate_structured_validated, LlmProvider, StructuredPrompt};
use crate::model::event::WorkerKind;
use crate::model::itinerary::{Day, Itinerary};
use crate::model::node::{Node, NodeType, Timing};

const TASK_TYPE: &str = "create";

#[derive(Debug, Deserialize, JsonSchema)]
struct SkeletonSlot {
    day_number: u32,
    title: String,
    node_type: NodeType,
    #[serde(default)]
    start_epoch_millis: Option<i64>,
    #[serde(default)]
    end_epoch_millis: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SkeletonResponse {
    slots: Vec<SkeletonSlot>,
}

/// Deterministic fallback used when no LLM provider is wired (or it fails):
/// one attraction, one meal, one transit placeholder per day, spread evenly.
fn deterministic_slots(itinerary: &Itinerary) -> Vec<SkeletonSlot> {
    let mut slots = Vec::new();
    for day_number in 1..=itinerary.trip.day_count().max(0) as u32 {
        for (offset, node_type) in [NodeType::Attraction, NodeType::Meal, NodeType::Transit]
            .into_iter()
            .enumerate()
        {
            slots.push(SkeletonSlot {
                day_number,
                title: format!("Placeholder {node_type:?} {}", offset + 1),
                node_type,
                start_epoch_millis: None,
                end_epoch_millis: None,
            });
        }
    }
    slots
}

/// Produces the day structure. Not chat-enabled: only the pipeline's create
/// path invokes it.
pub struct SkeletonWorker;

impl SkeletonWorker {
    fn build_days(itinerary: &Itinerary, slots: Vec<SkeletonSlot>) -> Vec<Day> {
        let day_count = itinerary.trip.day_count().max(0) as u32;
        let mut days: Vec<Day> = (1..=day_count)
            .map(|n| {
                let date = itinerary.trip.start_date + chrono::Duration::days((n - 1) as i64);
                Day::new(n, date)
            })
            .collect();

        for slot in slots {
            let Some(day) = days.iter_mut().find(|d| d.day_number == slot.day_number) else {
                continue;
            };
            let position = day.nodes.len();
            let node_id = format!("day{}_node{}", slot.day_number, position + 1);
            let mut node = Node::new(node_id, slot.title, slot.node_type);
            node.timing = Timing {
                start_epoch_millis: slot.start_epoch_millis,
                end_epoch_millis: slot.end_epoch_millis,
                duration_minutes: None,
            };
            day.nodes.push(node);
        }
        days
    }
}

#[async_trait]
impl Worker for SkeletonWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Skeleton,
            priority: 0,
            chat_enabled: false,
            produces_changeset: false,
        }
    }

    async fn execute(
        &self,
        itinerary: &Itinerary,
        _request: &WorkerRequest,
        _execution_id: &str,
    ) -> Result<WorkerOutput> {
        let mut populated = itinerary.clone();
        populated.days = Self::build_days(itinerary, deterministic_slots(itinerary));
        Ok(WorkerOutput::Populated(populated))
    }
}

/// LLM-backed variant used when a provider is configured: asks for
/// day-by-day slot suggestions grounded in the trip's destination and
/// interests, falling back to [`deterministic_slots`] on any LLM failure so
/// skeleton generation is never a hard dependency on the provider.
pub struct LlmSkeletonWorker {
    provider: std::sync::Arc<dyn LlmProvider>,
}

impl LlmSkeletonWorker {
    pub fn new(provider: std::sync::Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for LlmSkeletonWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Skeleton,
            priority: 10,
            chat_enabled: false,
            produces_changeset: false,
        }
    }

    async fn execute(
        &self,
        itinerary: &Itinerary,
        _request: &WorkerRequest,
        _execution_id: &str,
    ) -> Result<WorkerOutput> {
        let schema = schemars::schema_for!(SkeletonResponse);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Produce a day-by-day skeleton of attraction/meal/transit placeholder slots for a {} day trip to {} with interests {:?}.",
                itinerary.trip.day_count(),
                itinerary.trip.destination,
                itinerary.trip.interests
            ),
            schema,
        };
        let slots = match generate_structured_validated::<SkeletonResponse>(self.provider.as_ref(), &prompt).await {
            Ok(response) => response.slots,
            Err(EngineError::LlmFailure(_)) | Err(EngineError::SchemaViolation(_)) => {
                deterministic_slots(itinerary)
            }
            Err(other) => return Err(other),
        };

        let mut populated = itinerary.clone();
        populated.days = SkeletonWorker::build_days(itinerary, slots);
        Ok(WorkerOutput::Populated(populated))
    }
}
