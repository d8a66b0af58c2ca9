//! Durable, acked, DLQ-backed queue abstraction (§4.4): enqueue/dequeue
//! with explicit ack/nack, extended with a redelivery counter so an
//! unacked message that exceeds `max_redeliveries` moves to the
//! dead-letter queue instead of being requeued forever. No-ack is not a
//! supported mode — every `consume` must be followed by `ack` or `nack`.
//! A message older than the queue's configured TTL is dead-lettered on
//! consume rather than handed to a consumer (§6's `ttl_workflow`/`ttl_node`).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::error::TransportError;

#[derive(Debug, Clone)]
struct Envelope {
    id: String,
    payload: Value,
    redeliveries: u32,
    enqueued_at: Instant,
}

/// A durable point-to-point queue: messages are delivered to exactly one
/// consumer at a time and must be acked or nacked (§4.4).
#[async_trait]
pub trait Queue: Send + Sync {
    async fn publish(&self, payload: Value) -> Result<String, TransportError>;

    /// Deliver the next message, blocking up to `timeout`. `None` means no
    /// message was available within the window, not an error.
    async fn consume(&self, timeout: Duration) -> Result<Option<(String, Value)>, TransportError>;

    async fn ack(&self, message_id: &str) -> Result<(), TransportError>;

    /// Negative-ack: requeue for redelivery, or move to the dead-letter
    /// queue if `max_redeliveries` has been exceeded.
    async fn nack(&self, message_id: &str) -> Result<(), TransportError>;

    async fn len(&self) -> Result<usize, TransportError>;

    async fn is_empty(&self) -> Result<bool, TransportError> {
        Ok(self.len().await? == 0)
    }
}

/// In-memory [`Queue`] used for tests and in-process wiring.
pub struct InMemoryQueue {
    sender: mpsc::Sender<Envelope>,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    in_flight: Arc<Mutex<HashMap<String, Envelope>>>,
    dead_letters: Arc<Mutex<Vec<Value>>>,
    queued_count: AtomicUsize,
    max_redeliveries: u32,
    ttl: Duration,
}

impl InMemoryQueue {
    /// `capacity` bounds the channel (the queue's prefetch/backpressure
    /// limit, §6's `prefetch_workflow`/`prefetch_node`); `ttl` is the
    /// per-message age past which `consume` dead-letters instead of
    /// delivering.
    #[must_use]
    pub fn new(capacity: usize, max_redeliveries: u32, ttl: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
            queued_count: AtomicUsize::new(0),
            max_redeliveries,
            ttl,
        }
    }

    /// Build a queue from a [`crate::config::TransportConfig`]'s workflow-queue
    /// fields (`prefetch_workflow`, `ttl_workflow`, `max_redeliveries`).
    #[must_use]
    pub fn for_workflow_queue(config: &crate::config::TransportConfig) -> Self {
        Self::new(config.prefetch_workflow, config.max_redeliveries, config.ttl_workflow)
    }

    /// Build a queue from a [`crate::config::TransportConfig`]'s node-queue
    /// fields (`prefetch_node`, `ttl_node`, `max_redeliveries`).
    #[must_use]
    pub fn for_node_queue(config: &crate::config::TransportConfig) -> Self {
        Self::new(config.prefetch_node, config.max_redeliveries, config.ttl_node)
    }

    /// Messages that exceeded `max_redeliveries` without a successful ack.
    pub async fn dead_letters(&self) -> Vec<Value> {
        self.dead_letters.lock().await.clone()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn publish(&self, payload: Value) -> Result<String, TransportError> {
        let id = uuid::Uuid::new_v4().to_string();
        let envelope = Envelope { id: id.clone(), payload, redeliveries: 0, enqueued_at: Instant::now() };
        self.sender.try_send(envelope).map_err(|_| TransportError::Full)?;
        self.queued_count.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Delivers the next non-expired message within `timeout`. A message
    /// whose total time in the queue (since its original `publish`, not
    /// since its last redelivery) exceeds the configured TTL is
    /// dead-lettered instead of delivered, and the search continues against
    /// the remaining time budget.
    async fn consume(&self, timeout: Duration) -> Result<Option<(String, Value)>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut rx = self.receiver.lock().await;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(envelope)) => {
                    self.queued_count.fetch_sub(1, Ordering::Relaxed);
                    if envelope.enqueued_at.elapsed() > self.ttl {
                        self.dead_letters.lock().await.push(envelope.payload);
                        continue;
                    }
                    let id = envelope.id.clone();
                    let payload = envelope.payload.clone();
                    self.in_flight.lock().await.insert(id.clone(), envelope);
                    return Ok(Some((id, payload)));
                }
                Ok(None) | Err(_) => return Ok(None),
            }
        }
    }

    async fn ack(&self, message_id: &str) -> Result<(), TransportError> {
        self.in_flight
            .lock()
            .await
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| TransportError::NotInFlight(message_id.to_string()))
    }

    async fn nack(&self, message_id: &str) -> Result<(), TransportError> {
        let mut envelope = self
            .in_flight
            .lock()
            .await
            .remove(message_id)
            .ok_or_else(|| TransportError::NotInFlight(message_id.to_string()))?;

        envelope.redeliveries += 1;
        if envelope.redeliveries > self.max_redeliveries {
            self.dead_letters.lock().await.push(envelope.payload);
            return Ok(());
        }

        self.sender.try_send(envelope).map_err(|_| TransportError::Full)?;
        self.queued_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn len(&self) -> Result<usize, TransportError> {
        Ok(self.queued_count.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn long_ttl() -> Duration {
        Duration::from_secs(3600)
    }

    #[tokio::test]
    async fn publish_then_consume_roundtrips() {
        let q = InMemoryQueue::new(16, 3, long_ttl());
        let id = q.publish(json!({"k": "v"})).await.unwrap();
        let (got_id, payload) = q.consume(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(got_id, id);
        assert_eq!(payload, json!({"k": "v"}));
    }

    #[tokio::test]
    async fn consume_returns_none_on_empty_timeout() {
        let q = InMemoryQueue::new(16, 3, long_ttl());
        assert!(q.consume(Duration::from_millis(20)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_removes_from_in_flight_double_ack_fails() {
        let q = InMemoryQueue::new(16, 3, long_ttl());
        q.publish(json!(1)).await.unwrap();
        let (id, _) = q.consume(Duration::from_secs(1)).await.unwrap().unwrap();
        q.ack(&id).await.unwrap();
        assert!(q.ack(&id).await.is_err());
    }

    #[tokio::test]
    async fn nack_requeues_until_redelivery_limit_then_dead_letters() {
        let q = InMemoryQueue::new(16, 1, long_ttl());
        q.publish(json!("poison")).await.unwrap();

        let (id, _) = q.consume(Duration::from_secs(1)).await.unwrap().unwrap();
        q.nack(&id).await.unwrap(); // 1st redelivery, still under limit

        let (id, _) = q.consume(Duration::from_secs(1)).await.unwrap().unwrap();
        q.nack(&id).await.unwrap(); // exceeds max_redeliveries(1) -> DLQ

        assert!(q.consume(Duration::from_millis(20)).await.unwrap().is_none());
        assert_eq!(q.dead_letters().await, vec![json!("poison")]);
    }

    #[tokio::test]
    async fn len_tracks_queued_not_in_flight() {
        let q = InMemoryQueue::new(16, 3, long_ttl());
        q.publish(json!(1)).await.unwrap();
        q.publish(json!(2)).await.unwrap();
        assert_eq!(q.len().await.unwrap(), 2);
        q.consume(Duration::from_secs(1)).await.unwrap();
        assert_eq!(q.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_message_is_dead_lettered_on_consume() {
        let q = InMemoryQueue::new(16, 3, Duration::from_millis(50));
        q.publish(json!("stale")).await.unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(q.consume(Duration::from_millis(20)).await.unwrap().is_none());
        assert_eq!(q.dead_letters().await, vec![json!("stale")]);
        assert_eq!(q.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn for_workflow_and_node_queue_use_the_matching_config_fields() {
        let config = crate::config::TransportConfig::default();
        let workflow_q = InMemoryQueue::for_workflow_queue(&config);
        let node_q = InMemoryQueue::for_node_queue(&config);
        workflow_q.publish(json!(1)).await.unwrap();
        node_q.publish(json!(2)).await.unwrap();
        assert_eq!(workflow_q.len().await.unwrap(), 1);
        assert_eq!(node_q.len().await.unwrap(), 1);
    }
}
