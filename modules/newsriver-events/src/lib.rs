//! Source-configuration change events and their delivery stream.
//!
//! Events arrive on an at-least-once stream with consumer-group semantics:
//! any number of parallel consumers, each message delivered to exactly one
//! consumer at a time, pending messages reclaimable after an idle timeout.
//! The production transport is Redis Streams; tests use the in-memory
//! implementation.

pub mod memory;
pub mod redis_stream;
pub mod stream;
pub mod types;

pub use memory::InMemoryEventStream;
pub use redis_stream::RedisEventStream;
pub use stream::{Delivery, EventStream, StreamError};
pub use types::{EventType, SourceEvent};
