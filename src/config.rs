//! Typed, environment-overridable configuration.
//!
//! There is no global mutable config singleton. An [`EngineConfig`] is built
//! once (usually via [`EngineConfig::from_env`] at process start) and threaded
//! through component constructors — the [`crate::pipeline::PipelineOrchestrator`],
//! [`crate::change_engine::ChangeEngine`], [`crate::event_bus::EventBus`], and
//! [`crate::chat::ChatOrchestrator`] all take one by reference or clone.

use std::time::Duration;

/// Retry policy for a single worker invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt (default 2).
    pub max_retries: u32,
    /// Base delay for exponential backoff (default 500ms).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Process-wide engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout for LLM-backed worker invocations (default 60s).
    pub llm_worker_timeout: Duration,
    /// Timeout for external-API-backed worker invocations (default 30s).
    pub api_worker_timeout: Duration,
    /// Overall timeout for a single pipeline phase (default 5 minutes).
    pub phase_timeout: Duration,
    /// Retry policy applied to transient worker failures.
    pub worker_retry: RetryPolicy,
    /// Maximum number of idempotency cache entries (default 10,000).
    pub idempotency_cache_size: usize,
    /// Idempotency cache entry TTL (default 1 hour).
    pub idempotency_cache_ttl: Duration,
    /// Per-subscriber bounded event queue depth (default 256).
    pub event_queue_depth: usize,
    /// Idle subscriber expiry (default 30 minutes, per spec floor).
    pub subscriber_idle_timeout: Duration,
    /// Confidence below which the chat orchestrator asks for clarification
    /// instead of dispatching (default 0.6, deliberately not mandated as a
    /// constant per the spec's open question).
    pub chat_confidence_threshold: f64,
    /// Whether to keep a bounded in-memory replay buffer per event topic.
    /// Off by default: the spec leaves this open and the minimum core does
    /// not require it.
    pub event_replay_buffer_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm_worker_timeout: Duration::from_secs(60),
            api_worker_timeout: Duration::from_secs(30),
            phase_timeout: Duration::from_secs(300),
            worker_retry: RetryPolicy::default(),
            idempotency_cache_size: 10_000,
            idempotency_cache_ttl: Duration::from_secs(3600),
            event_queue_depth: 256,
            subscriber_idle_timeout: Duration::from_secs(30 * 60),
            chat_confidence_threshold: 0.6,
            event_replay_buffer_len: 0,
        }
    }
}

impl EngineConfig {
    /// Builds a config from defaults overridden by `ITINERARY_ENGINE_*`
    /// environment variables, falling back silently to the default on a
    /// missing or unparseable value (this is a tuning knob, not a boundary
    /// the process should refuse to start over).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("ITINERARY_ENGINE_LLM_WORKER_TIMEOUT_SECS") {
            cfg.llm_worker_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("ITINERARY_ENGINE_API_WORKER_TIMEOUT_SECS") {
            cfg.api_worker_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("ITINERARY_ENGINE_PHASE_TIMEOUT_SECS") {
            cfg.phase_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("ITINERARY_ENGINE_WORKER_MAX_RETRIES") {
            cfg.worker_retry.max_retries = v as u32;
        }
        if let Some(v) = env_u64("ITINERARY_ENGINE_IDEMPOTENCY_CACHE_SIZE") {
            cfg.idempotency_cache_size = v as usize;
        }
        if let Some(v) = env_u64("ITINERARY_ENGINE_IDEMPOTENCY_CACHE_TTL_SECS") {
            cfg.idempotency_cache_ttl = Duration::from_secs(v);
        }
        if let Ok(v) = std::env::var("ITINERARY_ENGINE_CHAT_CONFIDENCE_THRESHOLD") {
            if let Ok(parsed) = v.parse::<f64>() {
                cfg.chat_confidence_threshold = parsed;
            }
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse::<u64>().ok()
}
