//! Per-itinerary event bus (§4.6).
//!
//! Publication is non-blocking and best-effort per subscriber: a slow
//! subscriber gets a bounded queue with a drop-oldest policy rather than
//! backpressuring the publisher. A standard `tokio::sync::mpsc` channel
//! cannot drop its own head, so each subscriber gets a small ring buffer
//! guarded by a mutex plus a [`tokio::sync::Notify`] to wake its receiver —
//! publish only ever pushes and maybe pops, never awaits.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::model::event::AgentEvent;

/// Opaque handle identifying one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Queue {
    events: Mutex<VecDeque<AgentEvent>>,
    notify: Notify,
    closed: AtomicBool,
}

struct Subscriber {
    queue: Arc<Queue>,
    last_active: Mutex<Instant>,
}

/// The receiving half handed back by [`EventBus::subscribe`].
pub struct EventReceiver {
    queue: Arc<Queue>,
}

impl EventReceiver {
    /// Waits for the next event, or returns `None` once the bus has closed
    /// this subscription (via `unsubscribe` or idle expiry).
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.queue.events.lock().pop_front() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }
}

/// A registered subscription: the receiving half plus the handle needed to
/// unregister it early.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: EventReceiver,
}

/// Process-wide pub/sub component, one subtopic per itinerary identifier.
///
/// Per-topic subscriber-list mutation is guarded by a lock (a
/// [`parking_lot::Mutex`] per topic, held only long enough to register or
/// remove a subscriber); publishing never blocks on subscriber I/O — it only
/// pushes onto each subscriber's own bounded ring buffer and notifies.
pub struct EventBus {
    topics: DashMap<String, Arc<Mutex<HashMap<SubscriberId, Subscriber>>>>,
    queue_depth: usize,
    idle_timeout: Duration,
    replay_buffer_len: usize,
    replay: DashMap<String, Mutex<VecDeque<AgentEvent>>>,
}

impl EventBus {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            topics: DashMap::new(),
            queue_depth: config.event_queue_depth.max(1),
            idle_timeout: config.subscriber_idle_timeout,
            replay_buffer_len: config.event_replay_buffer_len,
            replay: DashMap::new(),
        }
    }

    /// Registers a new subscriber for `itinerary_id`. No backfill: the
    /// returned receiver only observes events published after this call,
    /// unless a replay buffer is configured (off by default), in which case
    /// buffered events are delivered first, oldest first.
    pub fn subscribe(&self, itinerary_id: &str) -> Subscription {
        let id = SubscriberId::new();
        let mut initial = VecDeque::with_capacity(self.queue_depth);
        if self.replay_buffer_len > 0 {
            if let Some(buffered) = self.replay.get(itinerary_id) {
                initial.extend(buffered.lock().iter().cloned());
            }
        }
        let queue = Arc::new(Queue {
            events: Mutex::new(initial),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let topic = self
            .topics
            .entry(itinerary_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone();
        topic.lock().insert(
            id,
            Subscriber {
                queue: queue.clone(),
                last_active: Mutex::new(Instant::now()),
            },
        );

        Subscription {
            id,
            receiver: EventReceiver { queue },
        }
    }

    pub fn unsubscribe(&self, itinerary_id: &str, id: SubscriberId) {
        if let Some(topic) = self.topics.get(itinerary_id) {
            if let Some(sub) = topic.lock().remove(&id) {
                sub.queue.closed.store(true, Ordering::Release);
                sub.queue.notify.notify_waiters();
            }
        }
    }

    /// Publishes `event` to every current subscriber of `itinerary_id`. Each
    /// subscriber's ring buffer drops its oldest entry on overflow; per §4.6
    /// that also surfaces as a `warning` event on the same topic, published
    /// once the drop-detecting pass below has released the topic lock (the
    /// per-topic mutex isn't reentrant, so publishing from inside the loop
    /// that holds it would deadlock).
    pub fn publish(&self, itinerary_id: &str, event: AgentEvent) {
        if self.publish_inner(itinerary_id, event) {
            self.publish_inner(
                itinerary_id,
                AgentEvent::warning(
                    "subscriber_queue_overflow",
                    "dropped oldest event for a slow subscriber",
                ),
            );
        }
    }

    /// Core publish step; returns `true` if any subscriber's queue dropped
    /// an event to make room for this one.
    fn publish_inner(&self, itinerary_id: &str, event: AgentEvent) -> bool {
        if self.replay_buffer_len > 0 {
            let entry = self
                .replay
                .entry(itinerary_id.to_string())
                .or_insert_with(|| Mutex::new(VecDeque::new()));
            let mut buf = entry.lock();
            buf.push_back(event.clone());
            while buf.len() > self.replay_buffer_len {
                buf.pop_front();
            }
        }

        let Some(topic) = self.topics.get(itinerary_id) else {
            return false;
        };
        let mut dropped = false;
        for sub in topic.lock().values() {
            let mut events = sub.queue.events.lock();
            if events.len() >= self.queue_depth {
                events.pop_front();
                dropped = true;
                warn!(itinerary_id, "dropping oldest event for slow subscriber");
            }
            events.push_back(event.clone());
            drop(events);
            *sub.last_active.lock() = Instant::now();
            sub.queue.notify.notify_one();
        }
        dropped
    }

    /// Removes subscribers that have been idle longer than the configured
    /// timeout. Callers run this periodically (e.g. from a background
    /// tick); it is not invoked from `publish`'s hot path.
    pub fn sweep_idle(&self) {
        let now = Instant::now();
        for topic in self.topics.iter() {
            let mut guard = topic.lock();
            let expired: Vec<SubscriberId> = guard
                .iter()
                .filter(|(_, sub)| now.duration_since(*sub.last_active.lock()) >= self.idle_timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in expired {
                if let Some(sub) = guard.remove(&id) {
                    sub.queue.closed.store(true, Ordering::Release);
                    sub.queue.notify.notify_waiters();
                }
            }
        }
    }

    pub fn subscriber_count(&self, itinerary_id: &str) -> usize {
        self.topics
            .get(itinerary_id)
            .map(|t| t.lock().len())
            .unwrap_or(0)
    }
}
