//! An itinerary generation and mutation engine: given a trip request, runs a
//! pipeline of specialized workers to populate a day-by-day itinerary, then
//! exposes a single change engine that every later edit — human or agent —
//! goes through, so there is exactly one place version conflicts, locks, and
//! idempotency get enforced.
//!
//! - [`init`] mints a new itinerary shell synchronously.
//! - [`pipeline`] runs generation in phases from that shell to a ready trip.
//! - [`change_engine`] is the authoritative mutation path for edits after
//!   that, used directly by chat-driven edits and the public API alike.
//! - [`chat`] classifies a free-text turn into an intent and dispatches it
//!   to a worker or the change engine.
//! - [`event_bus`] carries progress and mutation events out to subscribers.
//! - [`worker`] holds the specialized agents and the registry that maps a
//!   task type to the worker that owns it.
//! - [`identity`] and [`model`] are the shared data model: canonical node
//!   ids, the itinerary aggregate, changesets, diffs, and revisions.
//! - [`store`] and [`llm`] are the two external-collaborator interfaces
//!   (persistence and structured generation) plus in-memory/scripted doubles
//!   for tests.
//! - [`config`] and [`error`] are the ambient configuration and error
//!   taxonomy shared across every module above.

pub mod change_engine;
pub mod chat;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod identity;
pub mod init;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod worker;

pub use change_engine::ChangeEngine;
pub use chat::{ChatOrchestrator, ChatTurnEvent};
pub use config::EngineConfig;
pub use error::{EngineError, Result, Severity};
pub use event_bus::EventBus;
pub use init::{CreateRequest, InitializationService};
pub use llm::LlmProvider;
pub use pipeline::{ExecutionHandle, PipelineOrchestrator};
pub use store::DocumentStore;
pub use worker::{Worker, WorkerRegistry};
