//! Transport worker: fills transit slots with mode, duration, and a cost
//! estimate (§4.2 "transport" / populate-transport).

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
use crate::model::node::{Cost, NodeType};

const TASK_TYPE: &str = "populate-transport";

#[derive(Debug, Deserialize, JsonSchema)]
struct TransportFill {
    node_id: String,
    mode: String,
    duration_minutes: u32,
    cost: Cost,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TransportResponse {
    fills: Vec<TransportFill>,
}

pub struct TransportWorker {
    provider: Arc<dyn LlmProvider>,
    events: Arc<EventBus>,
}

impl TransportWorker {
    pub fn new(provider: Arc<dyn LlmProvider>, events: Arc<EventBus>) -> Self {
        Self { provider, events }
    }
}

#[async_trait]
impl Worker for TransportWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Transport,
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
                worker_kind: WorkerKind::Transport,
            },
            4000,
        );
        let schema = schemars::schema_for!(TransportResponse);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Given this itinerary skeleton, fill in a transit mode, duration and cost estimate for every transit-type node:\n{summary}"
            ),
            schema,
        };

        let mut populated = itinerary.clone();
        let fills = match generate_structured_validated::<TransportResponse>(self.provider.as_ref(), &prompt).await {
            Ok(response) => response.fills,
            Err(EngineError::LlmFailure(_)) | Err(EngineError::SchemaViolation(_)) => Vec::new(),
            Err(other) => return Err(other),
        };

        let fill_count = fills.len();
        for fill in fills {
            for day in &mut populated.days {
                if let Some(node) = day.node_mut(&fill.node_id) {
                    if node.node_type == Some(NodeType::Transit) {
                        node.title = format!("{} transfer", fill.mode);
                        node.timing.duration_minutes = Some(fill.duration_minutes);
                        node.cost = Some(fill.cost.clone());
                        node.details.insert(
                            "mode".to_string(),
                            serde_json::Value::String(fill.mode.clone()),
                        );
                    }
                }
            }
        }
        self.events.publish(
            &itinerary.id,
            AgentEvent::Progress {
                phase: Phase::Population,
                percent: Phase::Population.anchor_percent(),
                message: format!("filled {fill_count} transit node(s)"),
                worker_kind: WorkerKind::Transport,
            },
        );
        Ok(WorkerOutput::Populated(populated))
    }
}
