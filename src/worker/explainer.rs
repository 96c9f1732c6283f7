//! Explainer worker: read-only Q&A over the current itinerary (§4.2
//! "explainer" / explain). Chat-enabled; never mutates.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::{EngineError, Result};
use crate::identity::{self, SummaryScope};
use crate::llm::{generate_structured_validated, LlmProvider};
use crate::model::event::WorkerKind;
use crate::model::itinerary::Itinerary;

const TASK_TYPE: &str = "explain";

pub struct ExplainerWorker {
    provider: Arc<dyn LlmProvider>,
}

impl ExplainerWorker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for ExplainerWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Explainer,
            priority: 0,
            chat_enabled: true,
            produces_changeset: false,
        }
    }

    async fn execute(
        &self,
        itinerary: &Itinerary,
        request: &WorkerRequest,
        _execution_id: &str,
    ) -> Result<WorkerOutput> {
        let question = request
            .text
            .as_deref()
            .ok_or_else(|| EngineError::InvalidInput("explainer worker requires request.text".to_string()))?;
        let summary = identity::summarize_for_worker(
            itinerary,
            SummaryScope {
                worker_kind: WorkerKind::Explainer,
            },
            4000,
        );
        let prompt = crate::llm::StructuredPrompt {
            prompt: format!("Answer this question about the itinerary in one or two sentences, using only the facts below. Question: \"{question}\"\nItinerary:\n{summary}"),
            schema: schemars::schema_for!(AnswerOnly),
        };
        let answer: AnswerOnly = generate_structured_validated(self.provider.as_ref(), &prompt).await?;
        Ok(WorkerOutput::Explanation(answer.answer))
    }
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct AnswerOnly {
    answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmProvider;
    use crate::model::itinerary::{BudgetTier, CreationStatus, Day, Party, Settings, TripMetadata};
    use chrono::NaiveDate;

    fn blank_itinerary() -> Itinerary {
        let now = chrono::Utc::now();
        Itinerary {
            id: "itin_1".into(),
            owner_id: "user_1".into(),
            version: 1,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Ready,
            days: vec![Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap())],
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
    async fn answers_without_mutating() {
        let itin = blank_itinerary();
        let response = serde_json::json!({"answer": "Day 1 has no nodes yet."});
        let worker = ExplainerWorker::new(Arc::new(ScriptedLlmProvider::new(response)));
        let request = WorkerRequest {
            text: Some("What's happening on day 1?".to_string()),
            ..Default::default()
        };
        let output = worker.execute(&itin, &request, "exec_1").await.unwrap();
        let WorkerOutput::Explanation(text) = output else {
            panic!("expected explanation output");
        };
        assert!(text.contains("Day 1"));
    }

    #[tokio::test]
    async fn missing_question_is_invalid_input() {
        let itin = blank_itinerary();
        let worker = ExplainerWorker::new(Arc::new(crate::llm::NoopLlmProvider));
        let result = worker.execute(&itin, &WorkerRequest::default(), "exec_1").await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }
}
