//! Queue module for the log sink.
//!
//! Provides the durable queue abstraction, its Redis Streams and in-memory
//! implementations, and the consumer that turns queue entries into index actions.

mod broker;
mod consumer;
mod memory;
mod messages;
mod redis_broker;

pub use broker::{QueueBroker, QueueSession};
pub use consumer::{PendingAckList, PendingEntry, QueueConsumer};
pub use memory::InMemoryBroker;
pub use messages::{AckHandle, QueueEntry};
pub use redis_broker::{RedisBroker, RedisBrokerConfig, PAYLOAD_FIELD};
