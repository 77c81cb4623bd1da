use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::SourceEvent;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One delivered stream entry. The payload is the raw JSON envelope;
/// decoding is the consumer's problem so that poison messages can be
/// acknowledged and dropped instead of looping forever.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Transport-level id used for acknowledgement.
    pub delivery_id: String,
    /// Raw JSON body of the event envelope.
    pub payload: String,
}

/// At-least-once event stream with consumer-group semantics.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Read up to `max` new messages for this consumer, blocking up to
    /// `block` when the stream is empty. Delivered messages stay pending
    /// until acknowledged.
    async fn read(&self, max: usize, block: Duration) -> Result<Vec<Delivery>, StreamError>;

    /// Acknowledge a delivery; the message leaves the pending set.
    async fn ack(&self, delivery_id: &str) -> Result<(), StreamError>;

    /// Claim messages that have been pending longer than `idle` from any
    /// consumer in the group, re-delivering them to this consumer.
    async fn reclaim_idle(
        &self,
        idle: Duration,
        max: usize,
    ) -> Result<Vec<Delivery>, StreamError>;

    /// Append an event to the stream. Used by producers and tests.
    async fn publish(&self, event: &SourceEvent) -> Result<String, StreamError>;
}
