//! Best-effort pub-sub keyed by execution id (§4.8). Subscribers that miss
//! events (slow consumer, late subscribe) are expected to resync via
//! `getStatus` rather than rely on perfect delivery — `tokio::sync::broadcast`
//! (a lossy, multi-consumer channel) is the right tool, not a durable log.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use flowcore_core::ExecutionId;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::event::ProgressEvent;

const RING_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 1024;

struct Channel {
    sender: broadcast::Sender<ProgressEvent>,
    ring: Mutex<Vec<ProgressEvent>>,
}

/// Retention: an execution's channel is discarded `grace_window` after its
/// terminal event, not immediately — late subscribers racing the terminal
/// transition still get a short window to catch up (§4.8).
#[derive(Clone)]
pub struct EventStream {
    channels: Arc<DashMap<ExecutionId, Arc<Channel>>>,
    grace_window: Duration,
}

impl EventStream {
    #[must_use]
    pub fn new(grace_window: Duration) -> Self {
        Self { channels: Arc::new(DashMap::new()), grace_window }
    }

    fn channel_for(&self, execution_id: ExecutionId) -> Arc<Channel> {
        self.channels
            .entry(execution_id)
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
                Arc::new(Channel { sender, ring: Mutex::new(Vec::new()) })
            })
            .clone()
    }

    /// Publish one event. Delivery is best-effort: if there are no
    /// subscribers, or a slow subscriber's buffer overflows, the event is
    /// simply dropped for that receiver.
    pub fn publish(&self, event: ProgressEvent) {
        let execution_id = event.execution_id();
        let channel = self.channel_for(execution_id);
        {
            let mut ring = channel.ring.lock();
            ring.push(event.clone());
            if ring.len() > RING_CAPACITY {
                ring.remove(0);
            }
        }
        let _ = channel.sender.send(event.clone());

        if matches!(event, ProgressEvent::ExecutionCompleted { .. }) {
            self.schedule_eviction(execution_id);
        }
    }

    fn schedule_eviction(&self, execution_id: ExecutionId) {
        let channels = self.channels.clone();
        let grace = self.grace_window;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            channels.remove(&execution_id);
        });
    }

    /// Subscribe to future events for `execution_id`, plus a snapshot of
    /// whatever is still in the ring buffer.
    #[must_use]
    pub fn subscribe(&self, execution_id: ExecutionId) -> (Vec<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let channel = self.channel_for(execution_id);
        let backlog = channel.ring.lock().clone();
        (backlog, channel.sender.subscribe())
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}
