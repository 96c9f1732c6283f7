//! Activity worker: fills attraction placeholders with real content
//! (§4.2 "activity" / populate-attractions).

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

const TASK_TYPE: &str = "populate-attractions";

#[derive(Debug, Deserialize, JsonSchema)]
struct AttractionFill {
    node_id: String,
    title: String,
    location: Location,
    #[serde(default)]
    tips: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AttractionResponse {
    fills: Vec<AttractionFill>,
}

pub struct ActivityWorker {
    provider: Arc<dyn LlmProvider>,
    events: Arc<EventBus>,
}

impl ActivityWorker {
    pub fn new(provider: Arc<dyn LlmProvider>, events: Arc<EventBus>) -> Self {
        Self { provider, events }
    }
}

#[async_trait]
impl Worker for ActivityWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Activity,
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
                worker_kind: WorkerKind::Activity,
            },
            4000,
        );
        let schema = schemars::schema_for!(AttractionResponse);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Given this itinerary skeleton, fill in real attraction details (title, location, tips) for every attraction-type node:\n{summary}"
            ),
            schema,
        };

        let mut populated = itinerary.clone();
        let fills = match generate_structured_validated::<AttractionResponse>(self.provider.as_ref(), &prompt).await {
            Ok(response) => response.fills,
            Err(EngineError::LlmFailure(_)) | Err(EngineError::SchemaViolation(_)) => Vec::new(),
            Err(other) => return Err(other),
        };

        let fill_count = fills.len();
        for fill in fills {
            for day in &mut populated.days {
                if let Some(node) = day.node_mut(&fill.node_id) {
                    if node.node_type == Some(NodeType::Attraction) {
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
                message: format!("filled {fill_count} attraction node(s)"),
                worker_kind: WorkerKind::Activity,
            },
        );
        Ok(WorkerOutput::Populated(populated))
    }
}
