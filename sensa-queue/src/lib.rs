//! Topic-based pub/sub used to connect pipeline stages.
//!
//! A [`Queue`] hands out [`Subscription`]s whose deliveries must each be
//! acknowledged or requeued exactly once. Workers of one stage share a single
//! subscription; the order in which they observe deliveries is unspecified.

pub mod memory;
pub mod mqtt;
pub mod nats;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

pub use memory::MemoryQueue;
pub use mqtt::{MqttOptions, MqttQueue};
pub use nats::{NatsOptions, NatsQueue};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("already subscribed to {topic} on channel {channel}")]
    AlreadySubscribed { topic: String, channel: String },
    #[error("acknowledgement failed: {0}")]
    Ack(String),
    #[error("queue is disconnected")]
    Disconnected,
}

/// Broker capability shared by every backend.
#[async_trait]
pub trait Queue: Send + Sync + 'static {
    /// Publish a payload. Safe to call concurrently from many workers.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), QueueError>;

    /// Subscribe `channel` to `topic`. Each channel of a topic receives its
    /// own copy of every message.
    async fn subscribe(&self, topic: &str, channel: &str) -> Result<Subscription, QueueError>;

    /// Stop a subscription. Its deliveries channel is closed once buffered
    /// messages are drained, which ends the workers' receive loops.
    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), QueueError>;

    /// Close the publish side of the connection.
    async fn disconnect(&self) -> Result<(), QueueError>;
}

/// Backend-specific settlement of a single delivery.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;
    async fn requeue(self: Box<Self>) -> Result<(), QueueError>;
}

/// A message received from a subscription.
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(topic: impl Into<String>, payload: Bytes, acker: Box<dyn Acker>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            acker,
        }
    }

    /// Mark the message as handled; it will not be redelivered.
    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    /// Hand the message back to the broker for redelivery.
    pub async fn requeue(self) -> Result<(), QueueError> {
        self.acker.requeue().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Receiving end of a subscription, cheap to clone and share between
/// workers.
#[derive(Clone)]
pub struct Subscription {
    topic: String,
    channel: String,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        channel: impl Into<String>,
        rx: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self {
            topic: topic.into(),
            channel: channel.into(),
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next delivery. `None` once the subscription is closed
    /// and drained.
    pub async fn recv(&self) -> Option<Delivery> {
        self.rx.lock().await.recv().await
    }
}

/// Default capacity of a subscription's buffer.
pub const DEFAULT_BUFFER: usize = 256;
