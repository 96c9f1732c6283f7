//! Error taxonomy for the itinerary engine.
//!
//! Every mutating operation in this crate returns a [`Result`] rather than
//! panicking or relying on caller introspection of a generic error. The
//! variants below are the complete taxonomy: workers, the change engine, and
//! the chat orchestrator all report through this single type so that
//! transport adapters only ever translate one shape into HTTP/WS responses.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Severity attached to `error` and `warning` agent events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

/// The complete error taxonomy, not a set of implementation-detail classes.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// `base_version` on a ChangeSet did not match the itinerary's current version.
    #[error("version conflict: itinerary is at version {current}, changeset targeted {requested}")]
    VersionConflict { current: u64, requested: u64 },

    /// A targeted node identifier is absent. Never silently retargeted.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Operation attempted against a locked node without an explicit unlock.
    #[error("node {0} is locked")]
    LockedTarget(String),

    /// Malformed ChangeSet, unknown operation tag, coordinate out of range,
    /// or a timing window with start > end.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Provider unreachable or returned unparseable output after retries.
    #[error("llm failure: {0}")]
    LlmFailure(String),

    /// Worker output failed schema validation.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Timeout or temporary network error; eligible for bounded retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Upstream phase failed such that this worker cannot proceed.
    #[error("dependency failure: {0}")]
    DependencyFailure(String),

    /// User identifier does not match the itinerary owner.
    #[error("not owned: user {user} does not own itinerary {itinerary}")]
    NotOwned { user: String, itinerary: String },

    /// Persistence layer rejected a read/write; the store is an external
    /// collaborator, this variant only carries its opaque message through.
    #[error("store error: {0}")]
    Store(String),

    /// Catch-all for unexpected conditions that don't merit their own
    /// taxonomy entry (kept narrow on purpose, see [`EngineError::Other`] doc).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// True for errors the orchestrator's bounded retry policy should act on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Maps an error to the severity an `error`/`warning` AgentEvent should carry.
    pub fn severity(&self) -> Severity {
        match self {
            EngineError::Transient(_) => Severity::Warn,
            EngineError::DependencyFailure(_) => Severity::Warn,
            EngineError::VersionConflict { .. }
            | EngineError::NodeNotFound(_)
            | EngineError::LockedTarget(_)
            | EngineError::InvalidInput(_)
            | EngineError::NotOwned { .. } => Severity::Error,
            EngineError::LlmFailure(_) | EngineError::SchemaViolation(_) => Severity::Error,
            EngineError::Store(_) | EngineError::Other(_) => Severity::Critical,
        }
    }

    /// Short machine-readable code, matching the taxonomy names in the spec
    /// (`version_conflict`, `node_not_found`, ...), for use in AgentEvent::error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::VersionConflict { .. } => "version_conflict",
            EngineError::NodeNotFound(_) => "node_not_found",
            EngineError::LockedTarget(_) => "locked_target",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::LlmFailure(_) => "llm_failure",
            EngineError::SchemaViolation(_) => "schema_violation",
            EngineError::Transient(_) => "transient",
            EngineError::DependencyFailure(_) => "dependency_failure",
            EngineError::NotOwned { .. } => "not_owned",
            EngineError::Store(_) => "store_error",
            EngineError::Other(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_is_not_retryable() {
        let err = EngineError::VersionConflict {
            current: 6,
            requested: 3,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "version_conflict");
        assert_eq!(err.severity(), Severity::Error);
    }

    #[test]
    fn transient_is_retryable_and_warn() {
        let err = EngineError::Transient("timeout".into());
        assert!(err.is_retryable());
        assert_eq!(err.severity(), Severity::Warn);
        assert_eq!(err.code(), "transient");
    }

    #[test]
    fn node_not_found_carries_identifier() {
        let err = EngineError::NodeNotFound("day4_node99".into());
        assert!(err.to_string().contains("day4_node99"));
    }
}
