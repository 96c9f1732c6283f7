//! Specialized workers and the registry that maps task type to worker
//! (§4.2).
//!
//! A worker is a value, not a string dispatched through reflection: each one
//! implements [`Worker`], declares its [`Capability`] up front, and is
//! registered once into a [`WorkerRegistry`] at process start.

pub mod activity;
pub mod booking;
pub mod cost;
pub mod editor;
pub mod enrichment;
pub mod explainer;
pub mod meal;
pub mod skeleton;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::model::changeset::ChangeSet;
use crate::model::event::WorkerKind;
use crate::model::itinerary::Itinerary;

/// The single task-type label a worker advertises (§ Glossary).
pub type TaskType = &'static str;

/// What a worker returns: either a ChangeSet for the Change Engine to apply,
/// or a mutated sub-tree the pipeline writes back directly (skeleton and the
/// population/enrichment/cost workers write in place; editor and booking
/// produce a ChangeSet).
pub enum WorkerOutput {
    Changeset(ChangeSet),
    Populated(Itinerary),
    /// Read-only natural-language answer (explainer): no mutation occurs.
    Explanation(String),
}

/// Free-form request payload handed to a worker. Each worker interprets the
/// fields relevant to its task type and ignores the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Capability metadata a worker declares at registration (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    pub task_type: TaskType,
    pub kind: WorkerKind,
    pub priority: i32,
    pub chat_enabled: bool,
    pub produces_changeset: bool,
}

/// One specialized agent handling exactly one task type.
#[async_trait]
pub trait Worker: Send + Sync {
    fn capability(&self) -> Capability;

    /// Executes against `itinerary` with `execution_id` threaded through for
    /// log correlation and cancellation. Implementations must validate their
    /// declared task type first and fail fast on mismatch (§4.2).
    async fn execute(
        &self,
        itinerary: &Itinerary,
        request: &WorkerRequest,
        execution_id: &str,
    ) -> Result<WorkerOutput>;
}

/// Ordered set of workers to run for one task: a single worker for the chat
/// path, or several for the pipeline path (e.g. population's three workers).
pub struct ExecutionPlan {
    pub workers: Vec<Arc<dyn Worker>>,
}

/// Maps task type to worker, enforcing the zero-overlap invariant among
/// chat-enabled workers at registration time.
#[derive(Default)]
pub struct WorkerRegistry {
    by_task_type: HashMap<TaskType, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `worker`, failing if a chat-enabled worker already owns its
    /// task type (§ Glossary "zero-overlap invariant").
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> Result<()> {
        let cap = worker.capability();
        if let Some(existing) = self.by_task_type.get(cap.task_type) {
            if existing.capability().chat_enabled && cap.chat_enabled {
                return Err(EngineError::InvalidInput(format!(
                    "task type '{}' already has a chat-enabled worker registered",
                    cap.task_type
                )));
            }
        }
        self.by_task_type.insert(cap.task_type, worker);
        Ok(())
    }

    pub fn worker_for(&self, task_type: TaskType) -> Option<Arc<dyn Worker>> {
        self.by_task_type.get(task_type).cloned()
    }

    pub fn chat_capable_workers(&self) -> Vec<Arc<dyn Worker>> {
        self.by_task_type
            .values()
            .filter(|w| w.capability().chat_enabled)
            .cloned()
            .collect()
    }

    /// Yields the worker(s) to run for `task_type`. Exactly one worker for
    /// any registered task type today — the pipeline phases that use several
    /// workers (population) compose their own [`ExecutionPlan`]s directly
    /// rather than through this lookup, since they fan out across task types
    /// rather than within one.
    pub fn plan(&self, task_type: TaskType) -> Result<ExecutionPlan> {
        let worker = self
            .worker_for(task_type)
            .ok_or_else(|| EngineError::InvalidInput(format!("no worker registered for task type '{task_type}'")))?;
        Ok(ExecutionPlan {
            workers: vec![worker],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::skeleton::SkeletonWorker;

    #[test]
    fn plan_returns_registered_worker() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(SkeletonWorker)).unwrap();
        let plan = registry.plan("create").unwrap();
        assert_eq!(plan.workers.len(), 1);
    }

    #[test]
    fn plan_fails_for_unknown_task_type() {
        let registry = WorkerRegistry::new();
        assert!(registry.plan("nonexistent").is_err());
    }

    #[test]
    fn chat_capable_workers_excludes_non_chat_workers() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(SkeletonWorker)).unwrap();
        assert!(registry.chat_capable_workers().is_empty());
    }
}
