//! Meal worker: fills meal slots, inferring breakfast/lunch/dinner by slot
//! time (§4.2 "meal" / populate-meals).

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use std::sync::Arc;

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::{EngineError, Result};
use crate::event_bus::EventBus;
use crate::identity::{self, SummaryScope};
use crate::llm::{generate_structured_validated, LlmProvider, StructuredPrompt};
use crate::model::event::{AgentEvent, Phase, WorkerKind};
use crate::model::itinerary::Itinerary;
use crate::model::node::{Location, NodeType};

const TASK_TYPE: &str = "populate-meals";

/// Breakfast/lunch/dinner label inferred from a slot's start time, purely
/// for the prompt — the stored node keeps its generic `meal` type.
fn infer_meal_label(start_epoch_millis: Option<i64>) -> &'static str {
    let Some(millis) = start_epoch_millis else {
        return "meal";
    };
    let hour = ((millis / 3_600_000) % 24 + 24) % 24;
    match hour {
        5..=10 => "breakfast",
        11..=15 => "lunch",
        _ => "dinner",
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MealFill {
    node_id: String,
    title: String,
    location: Location,
    #[serde(default)]
    tips: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MealResponse {
    fills: Vec<MealFill>,
}

pub struct MealWorker {
    provider: Arc<dyn LlmProvider>,
    events: Arc<EventBus>,
}

impl MealWorker {
    pub fn new(provider: Arc<dyn LlmProvider>, events: Arc<EventBus>) -> Self {
        Self { provider, events }
    }
}

#[async_trait]
impl Worker for MealWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Meal,
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
        let summary = identity::summarize_for_worker(
            itinerary,
            SummaryScope {
                worker_kind: WorkerKind::Meal,
            },
            4000,
        );

        let meal_labels: Vec<(String, &'static str)> = itinerary
            .days
            .iter()
            .flat_map(|d| d.nodes.iter())
            .filter(|n| n.node_type == Some(NodeType::Meal))
            .map(|n| (n.id.clone(), infer_meal_label(n.timing.start_epoch_millis)))
            .collect();

        let schema = schemars::schema_for!(MealResponse);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Given this itinerary skeleton and meal slot labels {meal_labels:?}, fill in a real restaurant suggestion for every meal-type node:\n{summary}"
            ),
            schema,
        };

        let mut populated = itinerary.clone();
        let fills = match generate_structured_validated::<MealResponse>(self.provider.as_ref(), &prompt).await {
            Ok(response) => response.fills,
            Err(EngineError::LlmFailure(_)) | Err(EngineError::SchemaViolation(_)) => Vec::new(),
            Err(other) => return Err(other),
        };

        let fill_count = fills.len();
        for fill in fills {
            for day in &mut populated.days {
                if let Some(node) = day.node_mut(&fill.node_id) {
                    if node.node_type == Some(NodeType::Meal) {
                        node.title = fill.title.clone();
                        node.location = Some(fill.location.clone());
                        node.tips = fill.tips.clone();
                    }
                }
            }
        }
        self.events.publish(
            &itinerary.id,
            AgentEvent::Progress {
                phase: Phase::Population,
                percent: Phase::Population.anchor_percent(),
                message: format!("filled {fill_count} meal node(s)"),
                worker_kind: WorkerKind::Meal,
            },
        );
        Ok(WorkerOutput::Populated(populated))
    }
}
