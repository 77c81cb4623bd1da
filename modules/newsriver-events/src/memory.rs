//! In-memory [`EventStream`] with the same delivery semantics as the Redis
//! implementation. For tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::stream::{Delivery, EventStream, StreamError};
use crate::types::SourceEvent;

#[derive(Default)]
pub struct InMemoryEventStream {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    queue: VecDeque<(String, String)>,
    pending: Vec<PendingEntry>,
}

struct PendingEntry {
    id: String,
    payload: String,
    delivered_at: Instant,
}

impl InMemoryEventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered but not yet acknowledged.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Backdate a pending delivery so reclaim tests don't have to sleep.
    pub fn age_pending(&self, delivery_id: &str, by: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.pending.iter_mut().find(|p| p.id == delivery_id) {
            entry.delivered_at -= by;
        }
    }
}

#[async_trait::async_trait]
impl EventStream for InMemoryEventStream {
    async fn read(&self, max: usize, _block: Duration) -> Result<Vec<Delivery>, StreamError> {
        let mut inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for _ in 0..max {
            let Some((id, payload)) = inner.queue.pop_front() else {
                break;
            };
            inner.pending.push(PendingEntry {
                id: id.clone(),
                payload: payload.clone(),
                delivered_at: Instant::now(),
            });
            out.push(Delivery {
                delivery_id: id,
                payload,
            });
        }
        Ok(out)
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.retain(|p| p.id != delivery_id);
        Ok(())
    }

    async fn reclaim_idle(
        &self,
        idle: Duration,
        max: usize,
    ) -> Result<Vec<Delivery>, StreamError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let mut out = Vec::new();
        for entry in inner.pending.iter_mut() {
            if out.len() >= max {
                break;
            }
            if now.duration_since(entry.delivered_at) >= idle {
                entry.delivered_at = now;
                out.push(Delivery {
                    delivery_id: entry.id.clone(),
                    payload: entry.payload.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn publish(&self, event: &SourceEvent) -> Result<String, StreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("{}-0", inner.next_id);
        let payload = serde_json::to_string(event)?;
        inner.queue.push_back((id.clone(), payload));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, SourceEvent};
    use serde_json::json;
    use uuid::Uuid;

    fn event() -> SourceEvent {
        SourceEvent::new(EventType::SourceCreated, Uuid::new_v4(), json!({}))
    }

    #[tokio::test]
    async fn publish_read_ack_cycle() {
        let stream = InMemoryEventStream::new();
        stream.publish(&event()).await.unwrap();
        stream.publish(&event()).await.unwrap();

        let batch = stream.read(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(stream.pending_count(), 2);

        stream.ack(&batch[0].delivery_id).await.unwrap();
        assert_eq!(stream.pending_count(), 1);
    }

    #[tokio::test]
    async fn read_respects_max() {
        let stream = InMemoryEventStream::new();
        for _ in 0..5 {
            stream.publish(&event()).await.unwrap();
        }
        let batch = stream.read(2, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn unacked_message_is_reclaimable_after_idle() {
        let stream = InMemoryEventStream::new();
        stream.publish(&event()).await.unwrap();

        let batch = stream.read(1, Duration::ZERO).await.unwrap();
        let id = batch[0].delivery_id.clone();

        // Not idle yet; nothing to reclaim.
        let none = stream
            .reclaim_idle(Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(none.is_empty());

        stream.age_pending(&id, Duration::from_secs(120));
        let reclaimed = stream
            .reclaim_idle(Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].delivery_id, id);
    }

    #[tokio::test]
    async fn acked_message_is_not_reclaimed() {
        let stream = InMemoryEventStream::new();
        stream.publish(&event()).await.unwrap();
        let batch = stream.read(1, Duration::ZERO).await.unwrap();
        let id = batch[0].delivery_id.clone();
        stream.age_pending(&id, Duration::from_secs(120));
        stream.ack(&id).await.unwrap();

        let reclaimed = stream
            .reclaim_idle(Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(reclaimed.is_empty());
    }
}
