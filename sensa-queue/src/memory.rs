//! In-process queue for tests and single-process deployments.
//!
//! Messages published to a topic without subscribers are discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Acker, DEFAULT_BUFFER, Delivery, Queue, QueueError, Subscription};

type Channels = HashMap<String, mpsc::Sender<Delivery>>;

#[derive(Clone, Default)]
pub struct MemoryQueue {
    topics: Arc<Mutex<HashMap<String, Channels>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self, topic: &str) -> Vec<mpsc::Sender<Delivery>> {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }
}

struct MemoryAcker {
    topic: String,
    payload: Bytes,
    tx: mpsc::WeakSender<Delivery>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        Ok(())
    }

    async fn requeue(self: Box<Self>) -> Result<(), QueueError> {
        let Some(tx) = self.tx.upgrade() else {
            debug!(topic = %self.topic, "Subscription closed, dropping requeued message");
            return Ok(());
        };

        let acker = MemoryAcker {
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            tx: tx.downgrade(),
        };
        let delivery = Delivery::new(self.topic, self.payload, Box::new(acker));

        // Redeliver from a separate task so a worker never waits on its own
        // full buffer.
        tokio::spawn(async move {
            let _ = tx.send(delivery).await;
        });
        Ok(())
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Disconnected);
        }

        for tx in self.senders(topic) {
            let acker = MemoryAcker {
                topic: topic.to_owned(),
                payload: payload.clone(),
                tx: tx.downgrade(),
            };
            let delivery = Delivery::new(topic, payload.clone(), Box::new(acker));
            if tx.send(delivery).await.is_err() {
                debug!(topic, "Subscriber went away during publish");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str, channel: &str) -> Result<Subscription, QueueError> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let channels = topics.entry(topic.to_owned()).or_default();

        if channels.contains_key(channel) {
            return Err(QueueError::AlreadySubscribed {
                topic: topic.to_owned(),
                channel: channel.to_owned(),
            });
        }

        let (tx, rx) = mpsc::channel(DEFAULT_BUFFER);
        channels.insert(channel.to_owned(), tx);
        Ok(Subscription::new(topic, channel, rx))
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), QueueError> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channels) = topics.get_mut(subscription.topic()) {
            channels.remove(subscription.channel());
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
