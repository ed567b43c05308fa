//! The event hub and its subscriber queues.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

/// Event type used when replay is impossible and the client must
/// re-reconcile through the change endpoint.
pub const STREAM_RESET: &str = "stream.reset";

/// A published event as seen by subscribers and the SSE layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
    /// Mirrors the affected row's `updatedAt` when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_ts: Option<String>,
}

impl BoardEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            event_id: None,
            event_ts: None,
        }
    }

    pub fn with_ts(mut self, ts: impl Into<String>) -> Self {
        self.event_ts = Some(ts.into());
        self
    }

    /// The sentinel emitted when a replay cursor has fallen off the buffer.
    pub fn reset() -> Self {
        Self::new(STREAM_RESET, serde_json::Value::Null)
    }
}

/// Result of a replay request.
#[derive(Debug, Clone)]
pub enum Replay {
    /// All retained events newer than the cursor, oldest first.
    Events(Vec<BoardEvent>),
    /// The cursor predates the retained window; client must reconcile.
    Reset,
}

struct SubscriberQueue {
    queue: Mutex<VecDeque<BoardEvent>>,
    notify: Notify,
    capacity: usize,
    closed: std::sync::atomic::AtomicBool,
}

impl SubscriberQueue {
    fn push(&self, event: BoardEvent) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            // Head-drop keeps live tailing moving for slow consumers.
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

struct HubState {
    buffer: VecDeque<BoardEvent>,
    subscribers: HashMap<u64, Arc<SubscriberQueue>>,
}

/// The process-wide bus. Cheap to clone via `Arc`.
pub struct EventHub {
    state: Mutex<HubState>,
    next_event_id: AtomicU64,
    next_subscriber_id: AtomicU64,
    buffer_size: usize,
    subscriber_queue_size: usize,
}

impl EventHub {
    pub fn new(buffer_size: usize, subscriber_queue_size: Option<usize>) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            state: Mutex::new(HubState {
                buffer: VecDeque::with_capacity(buffer_size),
                subscribers: HashMap::new(),
            }),
            next_event_id: AtomicU64::new(1),
            next_subscriber_id: AtomicU64::new(1),
            buffer_size,
            subscriber_queue_size: subscriber_queue_size.unwrap_or(buffer_size).max(1),
        }
    }

    /// Publish an event: assign its id, retain it for replay, fan out to
    /// subscribers. Never blocks on a slow subscriber.
    pub fn publish(&self, mut event: BoardEvent) -> BoardEvent {
        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        event.event_id = Some(event_id);

        let mut state = self.state.lock().unwrap();
        if state.buffer.len() >= self.buffer_size {
            state.buffer.pop_front();
        }
        state.buffer.push_back(event.clone());
        for queue in state.subscribers.values() {
            queue.push(event.clone());
        }
        debug!(event_id, event_type = %event.event_type, "published event");
        event
    }

    /// Register a new subscriber with its own bounded queue.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(SubscriberQueue {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: self.subscriber_queue_size,
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        self.state
            .lock()
            .unwrap()
            .subscribers
            .insert(id, queue.clone());
        Subscription {
            id,
            hub: Arc::clone(self),
            queue,
        }
    }

    /// Retained events with `eventId` greater than `since_id`, or a reset
    /// marker when the cursor predates the retained window.
    pub fn replay(&self, since_id: u64) -> Replay {
        let state = self.state.lock().unwrap();
        let oldest = state.buffer.front().and_then(|e| e.event_id);
        let next = self.next_event_id.load(Ordering::SeqCst);
        match oldest {
            Some(oldest_id) => {
                if since_id + 1 < oldest_id {
                    return Replay::Reset;
                }
                Replay::Events(
                    state
                        .buffer
                        .iter()
                        .filter(|e| e.event_id.unwrap_or(0) > since_id)
                        .cloned()
                        .collect(),
                )
            }
            // Nothing retained: fine if nothing was ever missed.
            None if since_id + 1 >= next => Replay::Events(Vec::new()),
            None => Replay::Reset,
        }
    }

    /// Oldest retained event id, if any.
    pub fn oldest_id(&self) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .buffer
            .front()
            .and_then(|e| e.event_id)
    }

    fn unsubscribe(&self, id: u64) {
        if let Some(queue) = self.state.lock().unwrap().subscribers.remove(&id) {
            queue.closed.store(true, Ordering::SeqCst);
            queue.notify.notify_one();
        }
    }
}

/// A live subscription. Dropping it releases the queue.
pub struct Subscription {
    id: u64,
    hub: Arc<EventHub>,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the subscription is
    /// closed and drained.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        loop {
            if let Some(event) = self.queue.queue.lock().unwrap().pop_front() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Pop without waiting.
    pub fn try_recv(&mut self) -> Option<BoardEvent> {
        self.queue.queue.lock().unwrap().pop_front()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> BoardEvent {
        BoardEvent::new("log.appended", serde_json::json!({ "n": n }))
    }

    #[test]
    fn event_ids_are_monotonic_from_one() {
        let hub = EventHub::new(10, None);
        assert_eq!(hub.publish(event(0)).event_id, Some(1));
        assert_eq!(hub.publish(event(1)).event_id, Some(2));
        assert_eq!(hub.publish(event(2)).event_id, Some(3));
    }

    #[test]
    fn replay_returns_events_after_cursor() {
        let hub = EventHub::new(10, None);
        for n in 0..5 {
            hub.publish(event(n));
        }
        match hub.replay(2) {
            Replay::Events(events) => {
                let ids: Vec<u64> = events.iter().filter_map(|e| e.event_id).collect();
                assert_eq!(ids, vec![3, 4, 5]);
            }
            Replay::Reset => panic!("expected events"),
        }
    }

    #[test]
    fn stale_cursor_yields_reset() {
        let hub = EventHub::new(5, None);
        // Publish 15 events; buffer retains ids 11..=15.
        for n in 0..15 {
            hub.publish(event(n));
        }
        assert_eq!(hub.oldest_id(), Some(11));
        assert!(matches!(hub.replay(2), Replay::Reset));
        // Cursor exactly one before the oldest retained id is still fine.
        assert!(matches!(hub.replay(10), Replay::Events(_)));
    }

    #[test]
    fn empty_hub_replays_empty_without_reset() {
        let hub = EventHub::new(5, None);
        assert!(matches!(hub.replay(0), Replay::Events(events) if events.is_empty()));
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_keeps_newest() {
        let hub = Arc::new(EventHub::new(100, Some(3)));
        let mut sub = hub.subscribe();
        for n in 0..6 {
            hub.publish(event(n));
        }
        // Queue capacity 3: ids 4, 5, 6 survive.
        let ids: Vec<u64> = std::iter::from_fn(|| sub.try_recv())
            .filter_map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn recv_wakes_on_publish() {
        let hub = Arc::new(EventHub::new(10, None));
        let mut sub = hub.subscribe();
        let publisher = hub.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            publisher.publish(event(1));
        });
        let received = sub.recv().await.unwrap();
        assert_eq!(received.event_id, Some(1));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_subscription_is_removed() {
        let hub = Arc::new(EventHub::new(10, None));
        let sub = hub.subscribe();
        drop(sub);
        hub.publish(event(1));
        assert!(hub.state.lock().unwrap().subscribers.is_empty());
    }
}
