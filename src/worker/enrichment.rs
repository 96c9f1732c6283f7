//! Enrichment worker: adds location coordinates, hours, photos, and pacing
//! warnings (§4.2 "enrichment" / enrich). Chat-enabled, and also the
//! asynchronous auto-enrichment the Change Engine schedules after `apply`
//! (§4.3 step 9).

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use super::{Capability, Worker, WorkerOutput, WorkerRequest};
use crate::error::{EngineError, Result};
use crate::event_bus::EventBus;
use crate::identity::{self, SummaryScope};
use crate::llm::{generate_structured_validated, LlmProvider, StructuredPrompt};
use crate::model::event::{AgentEvent, EnhancementKind, WorkerKind};
use crate::model::itinerary::Itinerary;
use crate::model::node::Coordinates;

const TASK_TYPE: &str = "enrich";

#[derive(Debug, Deserialize, JsonSchema)]
struct NodeEnrichment {
    node_id: String,
    #[serde(default)]
    coordinates: Option<Coordinates>,
    #[serde(default)]
    hours: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    pacing_warning: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EnrichmentResponse {
    enrichments: Vec<NodeEnrichment>,
}

pub struct EnrichmentWorker {
    provider: Arc<dyn LlmProvider>,
    events: Arc<EventBus>,
}

impl EnrichmentWorker {
    pub fn new(provider: Arc<dyn LlmProvider>, events: Arc<EventBus>) -> Self {
        Self { provider, events }
    }
}

#[async_trait]
impl Worker for EnrichmentWorker {
    fn capability(&self) -> Capability {
        Capability {
            task_type: TASK_TYPE,
            kind: WorkerKind::Enrichment,
            priority: 0,
            chat_enabled: true,
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
                worker_kind: WorkerKind::Enrichment,
            },
            4000,
        );
        let schema = schemars::schema_for!(EnrichmentResponse);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Given this itinerary, suggest coordinates, opening hours, a representative photo URL, and any pacing warning for each node that is missing them:\n{summary}"
            ),
            schema,
        };

        let mut populated = itinerary.clone();
        let enrichments = match generate_structured_validated::<EnrichmentResponse>(self.provider.as_ref(), &prompt).await
        {
            Ok(response) => response.enrichments,
            Err(EngineError::LlmFailure(_)) | Err(EngineError::SchemaViolation(_)) => Vec::new(),
            Err(other) => return Err(other),
        };

        for enrichment in enrichments {
            for day in &mut populated.days {
                let Some(node) = day.node_mut(&enrichment.node_id) else {
                    continue;
                };
                if let Some(coords) = enrichment.coordinates {
                    coords.validate()?;
                    if let Some(location) = node.location.as_mut() {
                        location.coordinates = Some(coords);
                    }
                    self.events.publish(
                        &itinerary.id,
                        AgentEvent::NodeEnhanced {
                            node_id: node.id.clone(),
                            enhancement: EnhancementKind::Coordinates,
                        },
                    );
                }
                if let Some(hours) = enrichment.hours {
                    node.details
                        .insert("hours".to_string(), serde_json::Value::String(hours));
                    self.events.publish(
                        &itinerary.id,
                        AgentEvent::NodeEnhanced {
                            node_id: node.id.clone(),
                            enhancement: EnhancementKind::Hours,
                        },
                    );
                }
                if let Some(photo) = enrichment.photo_url {
                    node.links.push(photo);
                    self.events.publish(
                        &itinerary.id,
                        AgentEvent::NodeEnhanced {
                            node_id: node.id.clone(),
                            enhancement: EnhancementKind::Photos,
                        },
                    );
                }
                if let Some(warning) = enrichment.pacing_warning {
                    node.tips.push(warning);
                    self.events.publish(
                        &itinerary.id,
                        AgentEvent::NodeEnhanced {
                            node_id: node.id.clone(),
                            enhancement: EnhancementKind::PacingWarning,
                        },
                    );
                }
            }
        }
        Ok(WorkerOutput::Populated(populated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::llm::ScriptedLlmProvider;
    use crate::model::itinerary::{BudgetTier, CreationStatus, Day, Party, Settings, TripMetadata};
    use crate::model::node::{Location, Node, NodeType};
    use chrono::NaiveDate;

    fn itinerary_with_attraction() -> Itinerary {
        let now = chrono::Utc::now();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        let mut node = Node::new("day1_node1", "Castle", NodeType::Attraction);
        node.location = Some(Location {
            name: "Castle".into(),
            ..Default::default()
        });
        day.nodes.push(node);
        Itinerary {
            id: "itin_1".into(),
            owner_id: "user_1".into(),
            version: 1,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Generating,
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
    async fn attaches_coordinates_and_emits_node_enhanced() {
        let itin = itinerary_with_attraction();
        let response = serde_json::json!({
            "enrichments": [{
                "node_id": "day1_node1",
                "coordinates": {"lat": 52.25, "lng": 21.0},
                "hours": null,
                "photo_url": null,
                "pacing_warning": null
            }]
        });
        let events = Arc::new(EventBus::new(&EngineConfig::default()));
        let mut sub = events.subscribe("itin_1");
        let worker = EnrichmentWorker::new(Arc::new(ScriptedLlmProvider::new(response)), events);
        let output = worker.execute(&itin, &WorkerRequest::default(), "exec_1").await.unwrap();
        let WorkerOutput::Populated(populated) = output else {
            panic!("expected populated output");
        };
        assert_eq!(
            populated.days[0].nodes[0].location.as_ref().unwrap().coordinates,
            Some(Coordinates { lat: 52.25, lng: 21.0 })
        );
        let event = sub.receiver.recv().await.unwrap();
        assert!(matches!(event, AgentEvent::NodeEnhanced { .. }));
    }

    #[test]
    fn is_chat_enabled() {
        let events = Arc::new(EventBus::new(&EngineConfig::default()));
        let worker = EnrichmentWorker::new(Arc::new(crate::llm::NoopLlmProvider), events);
        assert!(worker.capability().chat_enabled);
    }
}
