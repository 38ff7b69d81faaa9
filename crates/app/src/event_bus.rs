//! In-process event bus — topic-scoped pub/sub with asynchronous dispatch.
//!
//! `publish` never blocks and never executes subscriber code on the
//! publisher's path: events are pushed onto a queue that a dedicated
//! dispatcher task drains in FIFO order. Because there is a single queue and
//! a single dispatcher, FIFO per publisher per topic holds globally.
//!
//! Subscribers match on exact topic strings or single-segment `*` wildcards
//! (`entity/*/state`). A failing subscriber is isolated: its error is logged
//! and republished on the `error` topic exactly once, and delivery to other
//! subscribers and later events is unaffected. Events with zero matching
//! subscribers are dropped; nothing is persisted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::BoxFuture;
use tokio::sync::Notify;

use hearth_domain::error::Result;
use hearth_domain::event::{BusEvent, topics};

/// Async handler invoked by the dispatcher for every matching event.
pub type EventHandler = Arc<dyn Fn(BusEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Subscriber {
    id: u64,
    pattern: TopicPattern,
    handler: EventHandler,
}

struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    queue: Mutex<VecDeque<BusEvent>>,
    notify: Arc<Notify>,
    next_id: AtomicU64,
}

impl Inner {
    fn push(&self, event: BusEvent) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
        self.notify.notify_one();
    }
}

/// Cloneable handle to the bus. All clones share one subscriber table and
/// one dispatch queue.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus and spawn its dispatcher task.
    ///
    /// The dispatcher holds only a weak reference; it exits once every
    /// [`EventBus`] handle is dropped.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            subscribers: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            notify: Arc::new(Notify::new()),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(dispatch_loop(Arc::downgrade(&inner)));

        Self { inner }
    }

    /// Enqueue an event for delivery. Never blocks; subscriber code never
    /// runs on the caller's path.
    pub fn publish(&self, event: BusEvent) {
        self.inner.push(event);
    }

    /// Register `handler` for every event whose topic matches `topic`
    /// (exact string or single-segment `*` wildcards).
    ///
    /// Returns an idempotent unsubscribe handle.
    pub fn subscribe(&self, topic: &str, handler: EventHandler) -> BusSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                pattern: TopicPattern::parse(topic),
                handler,
            });
        BusSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
            released: AtomicBool::new(false),
        }
    }

    /// Drop all subscribers and the pending queue. For test harnesses.
    pub fn clear(&self) {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of pending, undelivered events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_loop(inner: Weak<Inner>) {
    loop {
        let event = {
            let Some(strong) = inner.upgrade() else {
                return;
            };
            let next = strong
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(event) => event,
                None => {
                    // Keep only the notifier while idle so an abandoned bus
                    // can be freed; a permit stored by `publish` between the
                    // queue check and the await still wakes us.
                    let notify = Arc::clone(&strong.notify);
                    drop(strong);
                    notify.notified().await;
                    continue;
                }
            }
        };

        let Some(strong) = inner.upgrade() else {
            return;
        };

        // Snapshot matching handlers before invoking anything so that
        // unsubscribes during dispatch are safe.
        let matching: Vec<EventHandler> = {
            let subscribers = strong
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers
                .iter()
                .filter(|sub| sub.pattern.matches(&event.topic))
                .map(|sub| Arc::clone(&sub.handler))
                .collect()
        };

        for handler in matching {
            if let Err(err) = handler(event.clone()).await {
                tracing::warn!(topic = %event.topic, %err, "event subscriber failed");
                // Never republish failures of error-topic subscribers, or a
                // broken subscriber would feed itself forever.
                if event.topic != topics::ERROR {
                    strong.push(BusEvent::error(
                        "event_bus",
                        err.to_string(),
                        Some(serde_json::json!({ "topic": event.topic })),
                    ));
                }
            }
        }
    }
}

/// Idempotent unsubscribe handle returned by [`EventBus::subscribe`].
pub struct BusSubscription {
    id: u64,
    inner: Weak<Inner>,
    released: AtomicBool,
}

impl BusSubscription {
    /// Remove the subscriber. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|sub| sub.id != self.id);
        }
    }
}

/// A parsed topic pattern: literal segments with single-segment wildcards.
#[derive(Debug, Clone)]
struct TopicPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Any,
}

impl TopicPattern {
    fn parse(pattern: &str) -> Self {
        Self {
            segments: pattern
                .split('/')
                .map(|seg| {
                    if seg == "*" {
                        Segment::Any
                    } else {
                        Segment::Literal(seg.to_string())
                    }
                })
                .collect(),
        }
    }

    fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('/');
        for segment in &self.segments {
            match (parts.next(), segment) {
                (Some(_), Segment::Any) => {}
                (Some(part), Segment::Literal(lit)) if part == lit => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}
