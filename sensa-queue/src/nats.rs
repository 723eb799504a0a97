//! NATS JetStream backend.
//!
//! All topics live in one stream. Every `(topic, channel)` pair is a durable
//! pull consumer with explicit acks; a requeue is a NAK, which lets the
//! server redeliver with its own backoff.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_nats::jetstream::{self, AckKind, consumer::pull, stream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Acker, DEFAULT_BUFFER, Delivery, Queue, QueueError, Subscription};

#[derive(Debug, Clone)]
pub struct NatsOptions {
    pub url: String,
    /// JetStream stream holding every topic. Its subjects are
    /// `{stream}.>`.
    pub stream: String,
    pub connect_timeout: Duration,
}

pub struct NatsQueue {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream: String,
    subscriptions: Mutex<HashMap<(String, String), CancellationToken>>,
    shutdown: CancellationToken,
}

impl NatsQueue {
    pub async fn connect(options: &NatsOptions) -> Result<Self, QueueError> {
        info!(url = %options.url, stream = %options.stream, "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(options.connect_timeout)
            .connect(&options.url)
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());

        jetstream
            .get_or_create_stream(stream::Config {
                name: options.stream.clone(),
                subjects: vec![format!("{}.>", options.stream)],
                ..Default::default()
            })
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            jetstream,
            stream: options.stream.clone(),
            subscriptions: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    fn subject(&self, topic: &str) -> String {
        subject(&self.stream, topic)
    }
}

fn subject(stream: &str, topic: &str) -> String {
    format!("{stream}.{}", topic.replace('/', "."))
}

fn consumer_name(topic: &str, channel: &str) -> String {
    format!("{channel}-{topic}")
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | ' ' => '_',
            c => c,
        })
        .collect()
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acker for NatsAcker {
    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        self.message
            .ack()
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }

    async fn requeue(self: Box<Self>) -> Result<(), QueueError> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }
}

#[async_trait]
impl Queue for NatsQueue {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Disconnected);
        }

        let publish_err = |e: &dyn std::fmt::Display| QueueError::Publish {
            topic: topic.to_owned(),
            reason: e.to_string(),
        };

        self.jetstream
            .publish(self.subject(topic), payload)
            .await
            .map_err(|e| publish_err(&e))?
            .await
            .map_err(|e| publish_err(&e))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, channel: &str) -> Result<Subscription, QueueError> {
        let key = (topic.to_owned(), channel.to_owned());
        if self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
        {
            return Err(QueueError::AlreadySubscribed {
                topic: key.0,
                channel: key.1,
            });
        }

        let subscribe_err = |e: &dyn std::fmt::Display| QueueError::Subscribe {
            topic: topic.to_owned(),
            reason: e.to_string(),
        };

        let name = consumer_name(topic, channel);
        let consumer = self
            .jetstream
            .get_stream(&self.stream)
            .await
            .map_err(|e| subscribe_err(&e))?
            .get_or_create_consumer(
                &name,
                pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: self.subject(topic),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| subscribe_err(&e))?;
        let mut messages = consumer.messages().await.map_err(|e| subscribe_err(&e))?;

        let token = self.shutdown.child_token();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, token.clone());

        let (tx, rx) = mpsc::channel(DEFAULT_BUFFER);
        let pump_topic = topic.to_owned();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = messages.next() => match next {
                        Some(Ok(message)) => {
                            let payload = message.payload.clone();
                            let delivery = Delivery::new(
                                pump_topic.clone(),
                                payload,
                                Box::new(NatsAcker { message }),
                            );
                            if tx.send(delivery).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => warn!(error = %e, topic = %pump_topic, "NATS receive error"),
                        None => break,
                    },
                }
            }
            debug!(topic = %pump_topic, "NATS consumer stopped");
        });

        info!(topic, channel, consumer = %name, "Subscribed");
        Ok(Subscription::new(topic, channel, rx))
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), QueueError> {
        let key = (
            subscription.topic().to_owned(),
            subscription.channel().to_owned(),
        );
        if let Some(token) = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
        {
            token.cancel();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), QueueError> {
        self.shutdown.cancel();
        self.client
            .flush()
            .await
            .map_err(|e| QueueError::Connect(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_map_to_stream_subjects() {
        assert_eq!(subject("SENSA", "DecoderIn"), "SENSA.DecoderIn");
        assert_eq!(subject("SENSA", "lora/eu868/up"), "SENSA.lora.eu868.up");
    }

    #[test]
    fn consumer_names_are_sanitized() {
        assert_eq!(consumer_name("a/b.c", "eventer"), "eventer-a_b_c");
    }
}
