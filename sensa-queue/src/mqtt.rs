//! MQTT backend.
//!
//! Uses a persistent session with manual acks: a requeued message is simply
//! never acknowledged, and the broker redelivers it when the session
//! reconnects.
//!
//! MQTT has no channels. A filter is subscribed at the broker once per
//! connection and every channel on a matching filter gets its own copy of a
//! message. The broker ack is sent once every copy is acked; a single
//! requeue leaves the message unacked, so all channels see it again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Acker, DEFAULT_BUFFER, Delivery, Queue, QueueError, Subscription};

#[derive(Debug, Clone)]
pub struct MqttOptions {
    /// `mqtt://host:port`, `tcp://host:port` or `host[:port]`.
    pub url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

struct Route {
    filter: String,
    channel: String,
    tx: mpsc::Sender<Delivery>,
}

pub struct MqttQueue {
    client: AsyncClient,
    routes: Arc<Mutex<Vec<Route>>>,
    shutdown: CancellationToken,
}

impl MqttQueue {
    pub fn connect(options: &MqttOptions) -> Result<Self, QueueError> {
        let (host, port) = parse_broker_url(&options.url)?;
        info!(host, port, client_id = %options.client_id, "Connecting to MQTT broker");

        let mut client_options = rumqttc::MqttOptions::new(&options.client_id, host, port);
        client_options.set_keep_alive(options.keep_alive);
        client_options.set_clean_session(false);
        client_options.set_manual_acks(true);
        if let (Some(user), Some(pass)) = (&options.username, &options.password) {
            client_options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(client_options, DEFAULT_BUFFER);
        let routes = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(run_eventloop(
            eventloop,
            client.clone(),
            Arc::clone(&routes),
            shutdown.clone(),
        ));

        Ok(Self {
            client,
            routes,
            shutdown,
        })
    }
}

async fn run_eventloop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    routes: Arc<Mutex<Vec<Route>>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    route(&client, &routes, publish).await;
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected to MQTT broker"),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "MQTT connection error, reconnecting");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            },
        }
    }
    debug!("MQTT event loop stopped");
}

async fn route(client: &AsyncClient, routes: &Mutex<Vec<Route>>, publish: Publish) {
    let targets: Vec<mpsc::Sender<Delivery>> = routes
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|r| topic_matches(&r.filter, &publish.topic))
        .map(|r| r.tx.clone())
        .collect();

    if targets.is_empty() {
        debug!(topic = %publish.topic, "No route for message, acking");
        if let Err(e) = client.ack(&publish).await {
            warn!(error = %e, "Failed to ack unrouted message");
        }
        return;
    }

    let settle = Arc::new(Settle::new(client.clone(), publish, targets.len()));
    for tx in targets {
        let delivery = Delivery::new(
            settle.publish.topic.clone(),
            settle.publish.payload.clone(),
            Box::new(MqttAcker {
                settle: Arc::clone(&settle),
            }),
        );
        if tx.send(delivery).await.is_err() {
            debug!("Subscription closed while routing message");
        }
    }
}

/// Broker-side settlement shared by the copies of one message.
struct Settle {
    client: AsyncClient,
    publish: Publish,
    pending: AtomicUsize,
    requeued: AtomicBool,
}

impl Settle {
    fn new(client: AsyncClient, publish: Publish, copies: usize) -> Self {
        Self {
            client,
            publish,
            pending: AtomicUsize::new(copies),
            requeued: AtomicBool::new(false),
        }
    }

    /// Record one settled copy. True when it was the last one and no copy
    /// asked for redelivery.
    fn release(&self, requeue: bool) -> bool {
        if requeue {
            self.requeued.store(true, Ordering::SeqCst);
        }
        self.pending.fetch_sub(1, Ordering::SeqCst) == 1 && !self.requeued.load(Ordering::SeqCst)
    }
}

struct MqttAcker {
    settle: Arc<Settle>,
}

#[async_trait]
impl Acker for MqttAcker {
    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        if !self.settle.release(false) {
            return Ok(());
        }
        self.settle
            .client
            .ack(&self.settle.publish)
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }

    async fn requeue(self: Box<Self>) -> Result<(), QueueError> {
        self.settle.release(true);
        debug!(topic = %self.settle.publish.topic, "Leaving message unacked for redelivery");
        Ok(())
    }
}

#[async_trait]
impl Queue for MqttQueue {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Disconnected);
        }
        self.client
            .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| QueueError::Publish {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str, channel: &str) -> Result<Subscription, QueueError> {
        let (tx, rx) = mpsc::channel(DEFAULT_BUFFER);
        let first = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            if routes.iter().any(|r| r.filter == topic && r.channel == channel) {
                return Err(QueueError::AlreadySubscribed {
                    topic: topic.to_owned(),
                    channel: channel.to_owned(),
                });
            }
            let first = !routes.iter().any(|r| r.filter == topic);
            routes.push(Route {
                filter: topic.to_owned(),
                channel: channel.to_owned(),
                tx,
            });
            first
        };

        if first {
            if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
                self.routes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|r| !(r.filter == topic && r.channel == channel));
                return Err(QueueError::Subscribe {
                    topic: topic.to_owned(),
                    reason: e.to_string(),
                });
            }
        }

        info!(topic, channel, "Subscribed");
        Ok(Subscription::new(topic, channel, rx))
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), QueueError> {
        let last = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            routes.retain(|r| {
                !(r.filter == subscription.topic() && r.channel == subscription.channel())
            });
            !routes.iter().any(|r| r.filter == subscription.topic())
        };
        if !last {
            return Ok(());
        }

        self.client
            .unsubscribe(subscription.topic())
            .await
            .map_err(|e| QueueError::Subscribe {
                topic: subscription.topic().to_owned(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self) -> Result<(), QueueError> {
        let res = self
            .client
            .disconnect()
            .await
            .map_err(|e| QueueError::Connect(e.to_string()));
        self.shutdown.cancel();
        res
    }
}

fn parse_broker_url(url: &str) -> Result<(&str, u16), QueueError> {
    let url = url.trim_start_matches("mqtt://").trim_start_matches("tcp://");

    match url.split_once(':') {
        None => Ok((url, 1883)),
        Some((host, port)) => port
            .parse::<u16>()
            .map(|port| (host, port))
            .map_err(|_| QueueError::Connect(format!("invalid port in broker URL: {port}"))),
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter = filter.split('/');
    let mut topic = topic.split('/');

    loop {
        match (filter.next(), topic.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        assert!(topic_matches("v1/#", "v1/org/dev/json"));
        assert!(topic_matches("v1/#", "v1"));
        assert!(topic_matches("lora/+/gateway/+/event/+", "lora/eu868/gateway/g1/event/up"));
        assert!(!topic_matches("lora/+/gateway/+/event/+", "lora/eu868/gateway/g1/event"));
        assert!(!topic_matches("v1/+", "v1/org/dev"));
        assert!(topic_matches("DecoderIn", "DecoderIn"));
        assert!(!topic_matches("DecoderIn", "ValidatorIn"));
    }

    fn options() -> MqttOptions {
        MqttOptions {
            url: "127.0.0.1:1".to_owned(),
            client_id: "sensa-test".to_owned(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
        }
    }

    fn publish(topic: &str, payload: &'static [u8]) -> Publish {
        Publish::new(topic, QoS::AtLeastOnce, payload.to_vec())
    }

    #[tokio::test]
    async fn every_channel_of_a_topic_gets_a_copy() {
        let queue = MqttQueue::connect(&options()).unwrap();
        let accumulator = queue.subscribe("ValidatorOut", "accumulator").await.unwrap();
        let eventer = queue.subscribe("ValidatorOut", "eventer").await.unwrap();

        route(&queue.client, &queue.routes, publish("ValidatorOut", b"p1")).await;

        let a = accumulator.recv().await.unwrap();
        let b = eventer.recv().await.unwrap();
        assert_eq!(a.payload, Bytes::from_static(b"p1"));
        assert_eq!(b.payload, Bytes::from_static(b"p1"));
        a.ack().await.unwrap();
        b.ack().await.unwrap();

        queue.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn same_channel_twice_is_rejected() {
        let queue = MqttQueue::connect(&options()).unwrap();
        let _sub = queue.subscribe("ValidatorOut", "eventer").await.unwrap();
        let again = queue.subscribe("ValidatorOut", "eventer").await;
        assert!(matches!(again, Err(QueueError::AlreadySubscribed { .. })));
        queue.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribing_one_channel_keeps_the_other() {
        let queue = MqttQueue::connect(&options()).unwrap();
        let accumulator = queue.subscribe("ValidatorOut", "accumulator").await.unwrap();
        let eventer = queue.subscribe("ValidatorOut", "eventer").await.unwrap();
        queue.unsubscribe(&accumulator).await.unwrap();

        route(&queue.client, &queue.routes, publish("ValidatorOut", b"p2")).await;
        assert_eq!(
            eventer.recv().await.unwrap().payload,
            Bytes::from_static(b"p2")
        );
        assert!(accumulator.recv().await.is_none());

        queue.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn broker_ack_waits_for_every_copy() {
        let (client, _eventloop) =
            AsyncClient::new(rumqttc::MqttOptions::new("sensa-test", "localhost", 1883), 10);

        let settle = Settle::new(client.clone(), publish("ValidatorOut", b"x"), 2);
        assert!(!settle.release(false));
        assert!(settle.release(false));

        let settle = Settle::new(client, publish("ValidatorOut", b"x"), 2);
        assert!(!settle.release(true));
        assert!(!settle.release(false));
    }

    #[test]
    fn broker_urls() {
        assert_eq!(parse_broker_url("mqtt://localhost:1884").unwrap(), ("localhost", 1884));
        assert_eq!(parse_broker_url("broker").unwrap(), ("broker", 1883));
        assert!(parse_broker_url("tcp://host:nope").is_err());
    }
}
