//! Chat Orchestrator: turns one free-text user message into exactly one
//! dispatched worker call, or a clarifying question (§4.5).
//!
//! Classification, disambiguation, and dispatch are three separate steps on
//! purpose — a worker is never invoked against an unresolved node reference,
//! and a low-confidence classification never silently falls through to
//! "explain" as a default.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::change_engine::ChangeEngine;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::identity::{self, SummaryScope};
use crate::llm::{generate_structured_validated, LlmProvider, StructuredPrompt};
use crate::model::diff::Diff;
use crate::model::event::WorkerKind;
use crate::model::itinerary::Itinerary;
use crate::worker::{WorkerOutput, WorkerRegistry, WorkerRequest};

/// The classifier's output shape. Kept separate from any domain type: a
/// malformed classification can only ever select among these five labels,
/// never construct an arbitrary task type string.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum IntentLabel {
    Edit,
    Explain,
    Book,
    Enrich,
    Unknown,
}

impl IntentLabel {
    fn task_type(&self) -> Option<&'static str> {
        match self {
            IntentLabel::Edit => Some("edit"),
            IntentLabel::Explain => Some("explain"),
            IntentLabel::Book => Some("book"),
            IntentLabel::Enrich => Some("enrich"),
            IntentLabel::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ChatIntent {
    intent: IntentLabel,
    /// Free-text fragment naming the node the user is referring to, if any
    /// ("the museum visit", "day 2's dinner") — resolved against the
    /// itinerary's node titles, never trusted as an identifier directly.
    #[serde(default)]
    node_hint: Option<String>,
    /// Self-reported confidence in [0, 1]. Below
    /// [`EngineConfig::chat_confidence_threshold`] the orchestrator asks for
    /// clarification instead of dispatching (§4.5, resolved Open Question).
    confidence: f64,
}

/// One step of a chat turn's progress, streamed back to the caller so a
/// transport adapter can forward partial state (classifying, then dispatch,
/// then the final patch or answer) rather than blocking on the whole turn.
#[derive(Debug, Clone)]
pub enum ChatTurnEvent {
    Classifying,
    Dispatched { task_type: &'static str },
    Patched { diff: Diff, new_version: u64 },
    Answered { message: String },
    Clarify { question: String, candidates: Vec<String> },
    Failed { message: String },
}

/// Routes one chat message against one itinerary snapshot to the single
/// worker that should handle it, applying its ChangeSet through the Change
/// Engine when it produces one.
pub struct ChatOrchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<WorkerRegistry>,
    change_engine: Arc<ChangeEngine>,
    confidence_threshold: f64,
}

impl ChatOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<WorkerRegistry>,
        change_engine: Arc<ChangeEngine>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            change_engine,
            confidence_threshold: config.chat_confidence_threshold,
        }
    }

    /// Handles one message against `itinerary`, streaming progress as it
    /// goes. The stream always ends with exactly one of `Patched`,
    /// `Answered`, `Clarify`, or `Failed`.
    pub fn handle<'a>(
        &'a self,
        itinerary: &'a Itinerary,
        text: &'a str,
    ) -> impl Stream<Item = ChatTurnEvent> + 'a {
        stream! {
            yield ChatTurnEvent::Classifying;

            let intent = match self.classify(itinerary, text).await {
                Ok(intent) => intent,
                Err(err) => {
                    yield ChatTurnEvent::Failed { message: err.to_string() };
                    return;
                }
            };

            if intent.confidence < self.confidence_threshold {
                yield ChatTurnEvent::Clarify {
                    question: "I'm not confident I understood that — could you rephrase, naming the day or node directly?".to_string(),
                    candidates: Vec::new(),
                };
                return;
            }

            let Some(task_type) = intent.intent.task_type() else {
                yield ChatTurnEvent::Clarify {
                    question: "I couldn't tell what you'd like to do — edit, ask a question, book, or enrich a node?".to_string(),
                    candidates: Vec::new(),
                };
                return;
            };

            let node_id = match resolve_node_hint(itinerary, intent.node_hint.as_deref()) {
                Ok(id) => id,
                Err(candidates) if candidates.is_empty() => {
                    yield ChatTurnEvent::Clarify {
                        question: "I couldn't find a node matching that description.".to_string(),
                        candidates,
                    };
                    return;
                }
                Err(candidates) => {
                    yield ChatTurnEvent::Clarify {
                        question: "Which of these did you mean?".to_string(),
                        candidates,
                    };
                    return;
                }
            };

            let Some(worker) = self.registry.worker_for(task_type) else {
                yield ChatTurnEvent::Failed { message: format!("no worker registered for '{task_type}'") };
                return;
            };

            yield ChatTurnEvent::Dispatched { task_type };

            let execution_id = uuid::Uuid::new_v4().to_string();
            let request = WorkerRequest {
                text: Some(text.to_string()),
                day: None,
                node_id,
                params: serde_json::Map::new(),
            };

            let output = match worker.execute(itinerary, &request, &execution_id).await {
                Ok(output) => output,
                Err(err) => {
                    yield ChatTurnEvent::Failed { message: err.to_string() };
                    return;
                }
            };

            match output {
                WorkerOutput::Changeset(changeset) => {
                    match self.change_engine.apply(itinerary, &changeset).await {
                        Ok((new_version, diff)) => yield ChatTurnEvent::Patched { diff, new_version },
                        Err(err) => yield ChatTurnEvent::Failed { message: err.to_string() },
                    }
                }
                WorkerOutput::Explanation(message) => yield ChatTurnEvent::Answered { message },
                WorkerOutput::Populated(_) => {
                    yield ChatTurnEvent::Failed {
                        message: format!("worker '{task_type}' is not a chat-dispatchable worker"),
                    };
                }
            }
        }
    }

    /// Blocks until the stream from [`Self::handle`] produces its terminal
    /// event, discarding the intermediate progress events. Convenience for
    /// callers (tests, simple transports) that don't need streaming.
    pub async fn handle_to_completion(&self, itinerary: &Itinerary, text: &str) -> ChatTurnEvent {
        let mut stream = Box::pin(self.handle(itinerary, text));
        let mut last = ChatTurnEvent::Failed {
            message: "no response produced".to_string(),
        };
        while let Some(event) = stream.next().await {
            last = event;
        }
        last
    }

    async fn classify(&self, itinerary: &Itinerary, text: &str) -> crate::error::Result<ChatIntent> {
        let summary = identity::summarize_for_worker(
            itinerary,
            SummaryScope {
                worker_kind: WorkerKind::Explainer,
            },
            2000,
        );
        let schema = schemars::schema_for!(ChatIntent);
        let prompt = StructuredPrompt {
            prompt: format!(
                "Classify this user message against an itinerary as edit, explain, book, enrich, or unknown, naming the node it refers to if any, with a confidence in [0,1]. Message: \"{text}\"\nItinerary:\n{summary}"
            ),
            schema,
        };
        generate_structured_validated::<ChatIntent>(self.provider.as_ref(), &prompt).await
    }
}

/// Resolves a free-text node hint against the itinerary's node titles.
/// `Ok(None)` means no hint was given (the worker doesn't need one). `Ok(Some(id))`
/// means exactly one node matched. `Err(candidates)` means zero or several
/// matched and the caller must ask for clarification.
fn resolve_node_hint(itinerary: &Itinerary, hint: Option<&str>) -> Result<Option<String>, Vec<String>> {
    let Some(hint) = hint else {
        return Ok(None);
    };
    if identity::is_canonical_id(hint) && itinerary.find_node(hint).is_some() {
        return Ok(Some(hint.to_string()));
    }

    let needle = hint.to_lowercase();
    let matches: Vec<(String, String)> = itinerary
        .days
        .iter()
        .flat_map(|day| day.nodes.iter())
        .filter(|node| node.title.to_lowercase().contains(&needle))
        .map(|node| (node.id.clone(), node.title.clone()))
        .collect();

    match matches.len() {
        0 => Err(Vec::new()),
        1 => Ok(Some(matches.into_iter().next().unwrap().0)),
        _ => Err(matches.into_iter().map(|(id, title)| format!("{title} ({id})")).collect()),
    }
}
