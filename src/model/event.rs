//! AgentEvent: the tagged union delivered over the event bus.
//!
//! Every variant here corresponds to a line in §3's AgentEvent taxonomy.
//! Transport adapters encode this enum as text or binary frames; the core
//! never cares which.

use serde::{Deserialize, Serialize};

use super::diff::Diff;
use super::itinerary::Itinerary;
use crate::error::Severity;

/// Which pipeline phase an event pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Skeleton,
    Population,
    Enrichment,
    Cost,
    Finalization,
}

impl Phase {
    /// Phase-anchored progress percentage per §4.4.
    pub fn anchor_percent(self) -> u8 {
        match self {
            Phase::Skeleton => 10,
            Phase::Population => 40,
            Phase::Enrichment => 70,
            Phase::Cost => 90,
            Phase::Finalization => 100,
        }
    }
}

/// The kind of worker that produced a `progress` event, for client display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Skeleton,
    Activity,
    Meal,
    Transport,
    Enrichment,
    Cost,
    Editor,
    Explainer,
    Booking,
}

/// What kind of enhancement was applied to a node by auto-enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementKind {
    Coordinates,
    Hours,
    Photos,
    PacingWarning,
}

/// The complete tagged union of events delivered per itinerary topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Progress {
        phase: Phase,
        percent: u8,
        message: String,
        worker_kind: WorkerKind,
    },
    PhaseStart {
        phase: Phase,
    },
    PhaseComplete {
        phase: Phase,
        duration_ms: u64,
    },
    PatchApplied {
        diff: Diff,
        new_version: u64,
    },
    DayCompleted {
        day_number: u32,
    },
    NodeEnhanced {
        node_id: String,
        enhancement: EnhancementKind,
    },
    GenerationComplete {
        snapshot: Box<Itinerary>,
    },
    Warning {
        code: String,
        message: String,
        recovery_hint: Option<String>,
    },
    Error {
        code: String,
        message: String,
        severity: Severity,
        retryable: bool,
    },
}

impl AgentEvent {
    /// Builds an `error` event straight from an [`crate::error::EngineError`],
    /// keeping the code/severity/retryable mapping in one place.
    pub fn from_engine_error(err: &crate::error::EngineError) -> Self {
        AgentEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            severity: err.severity(),
            retryable: err.is_retryable(),
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        AgentEvent::Warning {
            code: code.into(),
            message: message.into(),
            recovery_hint: None,
        }
    }

    /// Builds a non-retryable `error` event at `critical` severity directly,
    /// for conditions that are fatal to the pipeline as a whole (all workers
    /// in a phase failed) rather than a single operation's own error kind.
    pub fn critical(code: impl Into<String>, message: impl Into<String>) -> Self {
        AgentEvent::Error {
            code: code.into(),
            message: message.into(),
            severity: Severity::Critical,
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn phase_anchors_match_spec_percentages() {
        assert_eq!(Phase::Skeleton.anchor_percent(), 10);
        assert_eq!(Phase::Population.anchor_percent(), 40);
        assert_eq!(Phase::Enrichment.anchor_percent(), 70);
        assert_eq!(Phase::Cost.anchor_percent(), 90);
        assert_eq!(Phase::Finalization.anchor_percent(), 100);
    }

    #[test]
    fn error_event_mirrors_engine_error() {
        let err = EngineError::Transient("timeout".into());
        let event = AgentEvent::from_engine_error(&err);
        match event {
            AgentEvent::Error {
                code,
                retryable,
                severity,
                ..
            } => {
                assert_eq!(code, "transient");
                assert!(retryable);
                assert_eq!(severity, Severity::Warn);
            }
            _ => panic!("expected Error variant"),
        }
    }
}
