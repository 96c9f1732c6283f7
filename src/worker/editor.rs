//! Editor worker: translates a free-text edit request into a ChangeSet
//! (§4.2 "editor" / edit). Chat-enabled; never applies anything itself —
//! the Chat Orchestrator hands the result to the Change Engine.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::{EngineError, Result};
use crate::identity::{self, SummaryScope};
use crate::llm::{generate_structured_validated, LlmProvider, StructuredPrompt};
use crate::model::event::WorkerKind;
use crate::model::itinerary::Itinerary;
use crate::model::node::{Cost, Location, Timing};

const TASK_TYPE: &str = "edit";

/// A loosely-typed operation shape an LLM can reliably fill in; mapped to
/// the engine's real [`crate::model::changeset::Operation`] after
/// generation. Kept separate from the domain type so a malformed LLM
/// response can never construct an engine-internal enum directly.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
enum EditOperation {
    Update {
        id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        location: Option<Location>,
        #[serde(default)]
        timing: Option<Timing>,
        #[serde(default)]
        cost: Option<Cost>,
    },
    Delete {
        id: String,
    },
    Move {
        id: String,
        destination_day: u32,
        destination_position: usize,
    },
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EditResponse {
    day: u32,
    ops: Vec<EditOperation>,
    reason: String,
}

pub struct EditorWorker {
    provider: Arc<dyn LlmProvider>,
}

impl EditorWorker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for EditorWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Editor,
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
        let text = request
            .text
            .as_deref()
            .ok_or_else(|| EngineError::InvalidInput("editor worker requires request.text".to_string()))?;
        let summary = identity::summarize_for_worker(
            itinerary,
            SummaryScope {
                worker_kind: WorkerKind::Editor,
            },
            4000,
        );
        let schema = schemars::schema_for!(EditResponse);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Translate this edit request into a single day's worth of update/delete/move operations against the itinerary below. Request: \"{text}\"\nItinerary:\n{summary}"
            ),
            schema,
        };

        let response = generate_structured_validated::<EditResponse>(self.provider.as_ref(), &prompt).await?;
        let ops = response
            .ops
            .into_iter()
            .map(|op| match op {
                EditOperation::Update {
                    id,
                    title,
                    location,
                    timing,
                    cost,
                } => crate::model::changeset::Operation::Update {
                    id,
                    title,
                    location,
                    timing,
                    cost,
                    details: None,
                    tips: None,
                    links: None,
                    locked: None,
                    booking_reference: None,
                },
                EditOperation::Delete { id } => crate::model::changeset::Operation::Delete { id },
                EditOperation::Move {
                    id,
                    destination_day,
                    destination_position,
                } => crate::model::changeset::Operation::Move {
                    id,
                    destination_day,
                    destination_position,
                },
            })
            .collect();

        Ok(WorkerOutput::Changeset(crate::model::changeset::ChangeSet {
            base_version: Some(itinerary.version),
            idempotency_key: None,
            day: response.day,
            ops,
            reason: response.reason,
            scope: None,
        }))
    }
}
