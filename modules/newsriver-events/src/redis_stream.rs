//! Redis Streams implementation of [`EventStream`].
//!
//! One stream, one consumer group. XREADGROUP delivers each entry to
//! exactly one consumer; unacknowledged entries stay in the pending list
//! and are picked up by `reclaim_idle` (XPENDING + XCLAIM) once their idle
//! time passes the timeout.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::streams::{StreamClaimReply, StreamPendingCountReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::stream::{Delivery, EventStream, StreamError};
use crate::types::SourceEvent;

pub struct RedisEventStream {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
}

impl RedisEventStream {
    /// Connect and ensure the consumer group exists. Creating a group that
    /// already exists is not an error.
    pub async fn connect(
        redis_url: &str,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, StreamError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        if let Err(e) = created {
            if !e.to_string().contains("BUSYGROUP") {
                return Err(e.into());
            }
        }

        Ok(Self {
            conn,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
        })
    }

    fn deliveries_from(reply: StreamReadReply) -> Vec<Delivery> {
        let mut out = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                match entry.get::<String>("payload") {
                    Some(payload) => out.push(Delivery {
                        delivery_id: entry.id.clone(),
                        payload,
                    }),
                    None => {
                        // An entry without a payload field can never decode;
                        // surface it so the consumer acks it away.
                        warn!(id = %entry.id, "Stream entry missing payload field");
                        out.push(Delivery {
                            delivery_id: entry.id.clone(),
                            payload: String::new(),
                        });
                    }
                }
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl EventStream for RedisEventStream {
    async fn read(&self, max: usize, block: Duration) -> Result<Vec<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max)
            .block(block.as_millis() as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[self.stream.as_str()], &[">"], &opts)
            .await?;

        Ok(Self::deliveries_from(reply))
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[delivery_id])
            .await?;
        Ok(())
    }

    async fn reclaim_idle(
        &self,
        idle: Duration,
        max: usize,
    ) -> Result<Vec<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        let idle_ms = idle.as_millis() as usize;

        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, "-", "+", max)
            .await?;

        let stale: Vec<String> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms as usize >= idle_ms)
            .map(|p| p.id.clone())
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = stale.len(), "Reclaiming idle stream entries");
        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.stream,
                &self.group,
                &self.consumer,
                idle_ms,
                &stale,
            )
            .await?;

        let mut out = Vec::new();
        for entry in claimed.ids {
            let payload = entry.get::<String>("payload").unwrap_or_default();
            out.push(Delivery {
                delivery_id: entry.id.clone(),
                payload,
            });
        }
        Ok(out)
    }

    async fn publish(&self, event: &SourceEvent) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let id: String = conn
            .xadd(&self.stream, "*", &[("payload", payload.as_str())])
            .await?;
        Ok(id)
    }
}
