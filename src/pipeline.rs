//! Pipeline Orchestrator: drives generation phases in dependency order
//! (§4.4).
//!
//! Every asynchronous run this orchestrator launches carries a completion
//! handler that publishes either `generation_complete` or an `error` event
//! — replacing the historical fire-and-forget bug named in §9.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event_bus::EventBus;
use crate::identity;
use crate::model::event::{AgentEvent, Phase, WorkerKind};
use crate::model::itinerary::{CreationStatus, Itinerary};
use crate::store::DocumentStore;
use crate::worker::{WorkerOutput, WorkerRequest, WorkerRegistry};

/// Handle returned by [`PipelineOrchestrator::run`]. Dropping it does not
/// cancel the run — call [`ExecutionHandle::cancel`] explicitly.
pub struct ExecutionHandle {
    pub execution_id: String,
    cancel_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl ExecutionHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Drives a create request through the skeleton -> population -> enrichment
/// -> cost -> finalization phases, publishing phase-anchored progress
/// throughout.
pub struct PipelineOrchestrator {
    store: Arc<dyn DocumentStore>,
    events: Arc<EventBus>,
    registry: Arc<WorkerRegistry>,
    config: EngineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        events: Arc<EventBus>,
        registry: Arc<WorkerRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            events,
            registry,
            config,
        }
    }

    /// Launches generation for `itinerary` (already persisted as a shell by
    /// the Initialization Service) and returns immediately with a handle.
    /// The actual phases run on a spawned task; its completion handler is
    /// unconditional per §9.
    pub fn run(&self, itinerary: Itinerary) -> ExecutionHandle {
        let execution_id = Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let store = self.store.clone();
        let events = self.events.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        let exec_id = execution_id.clone();

        let join = tokio::spawn(async move {
            let outcome = run_phases(&store, &events, &registry, &config, itinerary.clone(), &exec_id, cancel_rx).await;
            match outcome {
                Ok(final_itinerary) => {
                    events.publish(
                        &itinerary.id,
                        AgentEvent::GenerationComplete {
                            snapshot: Box::new(final_itinerary),
                        },
                    );
                }
                Err(PipelineOutcome::Cancelled) => {
                    events.publish(&itinerary.id, AgentEvent::warning("cancelled", "generation cancelled"));
                }
                Err(PipelineOutcome::Failed(err)) => {
                    // The critical `error` event for this failure was already
                    // published at the point of failure inside `run_phases`
                    // (see `fail_critical`) — skeleton and finalization
                    // failures abort the pipeline and must carry `critical`
                    // severity regardless of the underlying error kind, which
                    // `AgentEvent::from_engine_error` alone cannot guarantee.
                    error!(itinerary_id = %itinerary.id, error = %err, "pipeline failed");
                    if let Ok(Some(mut current)) = store.get_itinerary(&itinerary.id).await {
                        current.status = CreationStatus::Failed;
                        let _ = store.put_itinerary(&current).await;
                    }
                }
            }
        });

        ExecutionHandle {
            execution_id,
            cancel_tx,
            join,
        }
    }
}

enum PipelineOutcome {
    Cancelled,
    Failed(EngineError),
}

/// Publishes the `critical` error event §4.4 requires for skeleton,
/// population-total, and finalization failures, then wraps `err` as the
/// outcome — every hard phase abort goes through this one place so severity
/// is never left to the underlying error kind's own default.
fn fail_critical(events: &Arc<EventBus>, itinerary_id: &str, code: &str, err: EngineError) -> PipelineOutcome {
    events.publish(itinerary_id, AgentEvent::critical(code, err.to_string()));
    PipelineOutcome::Failed(err)
}

#[instrument(skip(store, events, registry, config, itinerary, cancel_rx), fields(execution_id = %execution_id, itinerary_id = %itinerary.id))]
async fn run_phases(
    store: &Arc<dyn DocumentStore>,
    events: &Arc<EventBus>,
    registry: &Arc<WorkerRegistry>,
    config: &EngineConfig,
    mut itinerary: Itinerary,
    execution_id: &str,
    mut cancel_rx: watch::Receiver<bool>,
) -> std::result::Result<Itinerary, PipelineOutcome> {
    macro_rules! bail_if_cancelled {
        () => {
            if *cancel_rx.borrow() {
                return Err(PipelineOutcome::Cancelled);
            }
        };
    }

    // Phase 1: Skeleton (blocking, no tolerance for failure).
    bail_if_cancelled!();
    events.publish(&itinerary.id, AgentEvent::PhaseStart { phase: Phase::Skeleton });
    let started = std::time::Instant::now();
    itinerary = run_single_worker(registry, config, &itinerary, "create", execution_id)
        .await
        .map_err(|err| fail_critical(events, &itinerary.id, "skeleton_phase_failed", err))?;
    events.publish(
        &itinerary.id,
        AgentEvent::PhaseComplete {
            phase: Phase::Skeleton,
            duration_ms: started.elapsed().as_millis() as u64,
        },
    );
    events.publish(
        &itinerary.id,
        AgentEvent::Progress {
            phase: Phase::Skeleton,
            percent: Phase::Skeleton.anchor_percent(),
            message: "skeleton complete".to_string(),
            worker_kind: WorkerKind::Skeleton,
        },
    );

    // Phase 2: Population (parallel, partial-failure tolerant unless every
    // worker in the phase fails, which escalates to a critical abort).
    bail_if_cancelled!();
    events.publish(&itinerary.id, AgentEvent::PhaseStart { phase: Phase::Population });
    let started = std::time::Instant::now();
    itinerary = match run_population_phase(registry, config, events, &itinerary, execution_id).await {
        Ok(populated) => populated,
        Err(all_failed_err) => {
            error!(error = %all_failed_err, "every population worker failed");
            return Err(fail_critical(events, &itinerary.id, "population_phase_failed", all_failed_err));
        }
    };
    events.publish(
        &itinerary.id,
        AgentEvent::PhaseComplete {
            phase: Phase::Population,
            duration_ms: started.elapsed().as_millis() as u64,
        },
    );
    for day in &itinerary.days {
        events.publish(&itinerary.id, AgentEvent::DayCompleted { day_number: day.day_number });
    }

    // Phase 3: Enrichment (single worker, best-effort: failures degrade, don't abort).
    bail_if_cancelled!();
    events.publish(&itinerary.id, AgentEvent::PhaseStart { phase: Phase::Enrichment });
    let started = std::time::Instant::now();
    match run_single_worker(registry, config, &itinerary, "enrich", execution_id).await {
        Ok(enriched) => itinerary = enriched,
        Err(err) => {
            warn!(error = %err, "enrichment phase degraded");
            events.publish(&itinerary.id, AgentEvent::from_engine_error(&err));
        }
    }
    events.publish(
        &itinerary.id,
        AgentEvent::PhaseComplete {
            phase: Phase::Enrichment,
            duration_ms: started.elapsed().as_millis() as u64,
        },
    );

    // Phase 4: Cost.
    bail_if_cancelled!();
    events.publish(&itinerary.id, AgentEvent::PhaseStart { phase: Phase::Cost });
    let started = std::time::Instant::now();
    itinerary = run_single_worker(registry, config, &itinerary, "estimate-cost", execution_id)
        .await
        .unwrap_or(itinerary);
    events.publish(
        &itinerary.id,
        AgentEvent::PhaseComplete {
            phase: Phase::Cost,
            duration_ms: started.elapsed().as_millis() as u64,
        },
    );

    // Phase 5: Finalization.
    bail_if_cancelled!();
    events.publish(&itinerary.id, AgentEvent::PhaseStart { phase: Phase::Finalization });
    let migrated = identity::migrate_if_needed(itinerary);
    let consistency_errors = identity::validate_consistency(&migrated);
    if !consistency_errors.is_empty() {
        let message = consistency_errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(fail_critical(
            events,
            &migrated.id,
            "finalization_phase_failed",
            EngineError::InvalidInput(message),
        ));
    }

    let mut finalized = migrated;
    finalized.status = CreationStatus::Ready;
    finalized.updated_at = chrono::Utc::now();
    store
        .put_itinerary(&finalized)
        .await
        .map_err(|err| fail_critical(events, &finalized.id, "finalization_phase_failed", err))?;
    events.publish(
        &finalized.id,
        AgentEvent::PhaseComplete {
            phase: Phase::Finalization,
            duration_ms: 0,
        },
    );

    Ok(finalized)
}

/// Adds up to 25% random jitter to a backoff delay so retrying workers
/// across many concurrent executions don't all wake on the same tick.
fn jittered(delay: Duration) -> Duration {
    let jitter = (delay.as_millis() as f64 * 0.25 * rand::random::<f64>()) as u64;
    delay + Duration::from_millis(jitter)
}

/// Runs the single named task-type worker with the configured timeout and
/// bounded retry for transient failures.
async fn run_single_worker(
    registry: &Arc<WorkerRegistry>,
    config: &EngineConfig,
    itinerary: &Itinerary,
    task_type: &'static str,
    execution_id: &str,
) -> Result<Itinerary> {
    let plan = registry.plan(task_type)?;
    let worker = plan.workers.into_iter().next().expect("plan always yields one worker");
    let request = WorkerRequest::default();

    let strategy = ExponentialBackoff::from_millis(config.worker_retry.base_delay.as_millis().max(1) as u64)
        .map(jittered)
        .take(config.worker_retry.max_retries as usize);

    let timeout = config.llm_worker_timeout;
    let itinerary = itinerary.clone();
    let execution_id = execution_id.to_string();

    let outcome = Retry::spawn(strategy, {
        let worker = worker.clone();
        let itinerary = itinerary.clone();
        let request = request.clone();
        let execution_id = execution_id.clone();
        move || {
            let worker = worker.clone();
            let itinerary = itinerary.clone();
            let request = request.clone();
            let execution_id = execution_id.clone();
            async move {
                match tokio::time::timeout(timeout, worker.execute(&itinerary, &request, &execution_id)).await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(EngineError::Transient(msg))) => Err(EngineError::Transient(msg)),
                    Ok(Err(other)) => Err(other),
                    Err(_) => Err(EngineError::Transient(format!("worker '{task_type}' timed out"))),
                }
            }
        }
    })
    .await?;

    match outcome {
        WorkerOutput::Populated(result) => Ok(result),
        WorkerOutput::Changeset(_) | WorkerOutput::Explanation(_) => Err(EngineError::InvalidInput(format!(
            "worker '{task_type}' is not a pipeline-phase worker"
        ))),
    }
}

/// Population phase: activity, meal, and transport workers run concurrently
/// over the same skeleton. A failing worker is logged and reported as a
/// `warning`; its nodes remain placeholders, and the other workers'
/// contributions still land (§4.4, §8 property 9's sibling: partial success
/// is not partial corruption — it's a node-scoped merge). If every worker in
/// the phase fails, that is no longer a tolerable partial result — the
/// caller escalates to a critical pipeline abort per §4.4's phase-failure
/// clause.
async fn run_population_phase(
    registry: &Arc<WorkerRegistry>,
    config: &EngineConfig,
    events: &Arc<EventBus>,
    itinerary: &Itinerary,
    execution_id: &str,
) -> std::result::Result<Itinerary, EngineError> {
    let task_types: [&'static str; 3] = ["populate-attractions", "populate-meals", "populate-transport"];
    let mut results = futures::future::join_all(
        task_types
            .iter()
            .map(|task_type| run_single_worker(registry, config, itinerary, *task_type, execution_id)),
    )
    .await;

    let mut merged = itinerary.clone();
    let mut failures = Vec::new();
    for (task_type, result) in task_types.iter().zip(results.drain(..)) {
        match result {
            Ok(populated) => merge_days(&mut merged, &populated),
            Err(err) => {
                warn!(task_type, error = %err, "population worker failed, continuing with placeholders");
                events.publish(
                    itinerary.id.as_str(),
                    AgentEvent::warning(format!("{task_type}_failed"), format!("{task_type} worker failed: {err}")),
                );
                failures.push((*task_type, err));
            }
        }
    }

    if failures.len() == task_types.len() {
        let detail = failures
            .iter()
            .map(|(task_type, err)| format!("{task_type}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(EngineError::DependencyFailure(format!(
            "all population workers failed: {detail}"
        )));
    }
    Ok(merged)
}

/// Merges `source`'s nodes into `target` by identifier, leaving any node
/// absent from `source` (e.g. because that worker failed entirely)
/// untouched in `target`.
fn merge_days(target: &mut Itinerary, source: &Itinerary) {
    for source_day in &source.days {
        let Some(target_day) = target.day_mut(source_day.day_number) else {
            continue;
        };
        for source_node in &source_day.nodes {
            if let Some(target_node) = target_day.node_mut(&source_node.id) {
                *target_node = source_node.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::NoopLlmProvider;
    use crate::model::itinerary::{BudgetTier, CreationStatus, Party, Settings, TripMetadata};
    use crate::store::InMemoryStore;
    use crate::worker::cost::CostWorker;
    use crate::worker::enrichment::EnrichmentWorker;
    use crate::worker::skeleton::SkeletonWorker;
    use crate::worker::{activity::ActivityWorker, meal::MealWorker, transport::TransportWorker};
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[test]
    fn jittered_never_shrinks_the_base_delay_and_stays_under_125_percent() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let d = jittered(base);
            assert!(d >= base);
            assert!(d <= base + Duration::from_millis(25));
        }
    }

    fn shell_itinerary() -> Itinerary {
        let now = chrono::Utc::now();
        Itinerary {
            id: "itin_1".into(),
            owner_id: "user_1".into(),
            version: 1,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Generating,
            days: vec![],
            settings: Settings::default(),
            trip: TripMetadata {
                destination: "Warsaw".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
                inclusive: true,
                party: Party {
                    adults: 2,
                    children: 0,
                    rooms: 1,
                },
                budget_tier: BudgetTier::Mid,
                interests: vec!["museums".into()],
                language: None,
            },
        }
    }

    fn build_registry() -> Arc<WorkerRegistry> {
        let provider = Arc::new(NoopLlmProvider);
        let events = Arc::new(EventBus::new(&EngineConfig::default()));
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(SkeletonWorker)).unwrap();
        registry
            .register(Arc::new(ActivityWorker::new(provider.clone(), events.clone())))
            .unwrap();
        registry
            .register(Arc::new(MealWorker::new(provider.clone(), events.clone())))
            .unwrap();
        registry
            .register(Arc::new(TransportWorker::new(provider.clone(), events.clone())))
            .unwrap();
        registry
            .register(Arc::new(EnrichmentWorker::new(provider.clone(), events)))
            .unwrap();
        registry.register(Arc::new(CostWorker)).unwrap();
        Arc::new(registry)
    }

    struct AlwaysFailsWorker {
        task_type: &'static str,
        kind: WorkerKind,
    }

    #[async_trait::async_trait]
    impl crate::worker::Worker for AlwaysFailsWorker {
        fn capability(&self) -> crate::worker::Capability {
            crate::worker::Capability {
                task_type: self.task_type,
                kind: self.kind,
                priority: 0,
                chat_enabled: false,
                produces_changeset: false,
            }
        }

        async fn execute(
            &self,
            _itinerary: &Itinerary,
            _request: &crate::worker::WorkerRequest,
            _execution_id: &str,
        ) -> Result<WorkerOutput> {
            Err(EngineError::Transient(format!("{} always fails", self.task_type)))
        }
    }

    #[tokio::test]
    async fn all_population_workers_failing_aborts_pipeline_as_critical() {
        let store = InMemoryStore::new();
        let events = Arc::new(EventBus::new(&EngineConfig::default()));
        let shell = shell_itinerary();
        store.put_itinerary(&shell).await.unwrap();

        let mut config = EngineConfig::default();
        config.worker_retry.max_retries = 0;
        config.llm_worker_timeout = Duration::from_secs(5);

        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(SkeletonWorker)).unwrap();
        registry
            .register(Arc::new(AlwaysFailsWorker {
                task_type: "populate-attractions",
                kind: WorkerKind::Activity,
            }))
            .unwrap();
        registry
            .register(Arc::new(AlwaysFailsWorker {
                task_type: "populate-meals",
                kind: WorkerKind::Meal,
            }))
            .unwrap();
        registry
            .register(Arc::new(AlwaysFailsWorker {
                task_type: "populate-transport",
                kind: WorkerKind::Transport,
            }))
            .unwrap();

        let orchestrator = PipelineOrchestrator::new(store.clone(), events.clone(), Arc::new(registry), config);
        let mut sub = events.subscribe(&shell.id);
        let handle = orchestrator.run(shell.clone());
        handle.join().await;

        let stored = store.get_itinerary(&shell.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CreationStatus::Failed);

        let mut saw_critical = false;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), sub.receiver.recv()).await {
            if let AgentEvent::Error { severity, .. } = event {
                if severity == crate::error::Severity::Critical {
                    saw_critical = true;
                }
            }
        }
        assert!(saw_critical, "expected a critical error event");
    }

    #[tokio::test]
    async fn full_pipeline_reaches_ready_status() {
        let store = InMemoryStore::new();
        let events = Arc::new(EventBus::new(&EngineConfig::default()));
        let shell = shell_itinerary();
        store.put_itinerary(&shell).await.unwrap();

        let mut config = EngineConfig::default();
        config.worker_retry.max_retries = 0;
        config.llm_worker_timeout = Duration::from_secs(5);

        let registry = build_registry();
        let orchestrator = PipelineOrchestrator::new(store.clone(), events.clone(), registry, config);
        let sub = events.subscribe(&shell.id);
        let handle = orchestrator.run(shell.clone());
        handle.join().await;

        let stored = store.get_itinerary(&shell.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CreationStatus::Ready);
        assert_eq!(stored.days.len(), 2);
        for day in &stored.days {
            assert!(!day.nodes.is_empty());
            for node in &day.nodes {
                assert!(crate::identity::is_canonical_id(&node.id));
                assert!(node.cost.is_some());
            }
        }
        drop(sub);
    }
}
