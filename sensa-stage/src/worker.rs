//! Worker pool shared by every stage.
//!
//! A stage is a [`Handler`] plus a [`StageContext`]. [`start`] subscribes it to
//! a topic and spawns N symmetric workers that pull from the one
//! subscription. The handler decides the fate of each delivery through its
//! [`Outcome`]; the worker only settles it with the broker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sensa_core::is_prime;
use sensa_queue::{Queue, QueueError, Subscription};
use sensa_store::StoreError;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::metrics::StageMetrics;

/// How a handled delivery is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed or permanently dropped.
    Ack,
    /// Transient failure; the broker redelivers.
    Requeue,
}

/// Logging and metrics handles owned by a stage.
#[derive(Clone)]
pub struct StageContext {
    pub name: &'static str,
    pub metrics: StageMetrics,
    pub span: Span,
    pub op_timeout: Duration,
}

impl StageContext {
    pub fn new(name: &'static str, metrics: StageMetrics, op_timeout: Duration) -> Self {
        Self {
            name,
            metrics,
            span: info_span!("stage", stage = name),
            op_timeout,
        }
    }

    /// Count an outcome of this stage.
    pub fn count(&self, outcome: &str) {
        self.metrics.incr(self.name, outcome);
    }

    /// Run a store or cache call under the per-operation timeout.
    pub async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        bounded(self.op_timeout, op).await
    }
}

/// Run a store or cache call under `timeout`. An elapsed timeout is a
/// transient error.
pub async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Transient(format!(
            "timed out after {timeout:?}"
        ))),
    }
}

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    fn context(&self) -> &StageContext;

    /// Process one delivery received on `topic`.
    async fn handle(&self, topic: &str, payload: &[u8]) -> Outcome;
}

/// Publish every message to `topic`, stopping at the first failure.
///
/// Returns whether all of them were published. Callers leave the inbound
/// message unsettled for redelivery when this is false; downstream
/// uniqueness keys absorb the duplicates.
pub async fn publish_all(
    queue: &dyn Queue,
    topic: &str,
    messages: impl IntoIterator<Item = Bytes>,
) -> bool {
    for message in messages {
        if let Err(e) = queue.publish(topic, message).await {
            error!(error = %e, topic, "publish failed");
            return false;
        }
    }
    true
}

/// Publish the priming sentinel to each topic a stage writes to.
pub async fn prime(queue: &dyn Queue, topics: &[&str]) -> Result<(), QueueError> {
    for topic in topics {
        queue
            .publish(topic, Bytes::from_static(&sensa_core::PRIME_PAYLOAD))
            .await?;
        debug!(topic, "primed topic");
    }
    Ok(())
}

/// A subscribed stage and its workers.
pub struct RunningStage {
    name: &'static str,
    queue: Arc<dyn Queue>,
    subscription: Subscription,
    workers: JoinSet<()>,
}

impl RunningStage {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unsubscribe and wait for the workers to drain. In-flight deliveries
    /// finish normally.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.queue.unsubscribe(&self.subscription).await {
            warn!(error = %e, stage = self.name, "unsubscribe failed");
        }
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, stage = self.name, "worker panicked");
            }
        }
        info!(stage = self.name, topic = self.subscription.topic(), "stage stopped");
    }
}

/// Subscribe `handler` to `topic` and spawn `workers` tasks for it.
pub async fn start<H: Handler>(
    handler: Arc<H>,
    queue: Arc<dyn Queue>,
    topic: &str,
    channel: &str,
    workers: usize,
) -> Result<RunningStage, QueueError> {
    let subscription = queue.subscribe(topic, channel).await?;
    let name = handler.context().name;

    let mut set = JoinSet::new();
    for worker in 0..workers.max(1) {
        let handler = handler.clone();
        let subscription = subscription.clone();
        let span = handler.context().span.clone();
        set.spawn(run_worker(handler, subscription, worker).instrument(span));
    }
    info!(stage = name, topic, channel, workers, "stage started");

    Ok(RunningStage {
        name,
        queue,
        subscription,
        workers: set,
    })
}

async fn run_worker<H: Handler>(handler: Arc<H>, subscription: Subscription, worker: usize) {
    debug!(worker, "worker started");
    let ctx = handler.context();

    while let Some(delivery) = subscription.recv().await {
        if is_prime(&delivery.payload) {
            ctx.count("prime");
            if let Err(e) = delivery.ack().await {
                warn!(error = %e, "ack of priming payload failed");
            }
            continue;
        }

        let outcome = handler.handle(&delivery.topic, &delivery.payload).await;
        let settled = match outcome {
            Outcome::Ack => delivery.ack().await,
            Outcome::Requeue => {
                ctx.count("requeue");
                delivery.requeue().await
            }
        };
        if let Err(e) = settled {
            ctx.count("settle_error");
            error!(error = %e, ?outcome, "failed to settle delivery");
        }
    }

    debug!(worker, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sensa_queue::MemoryQueue;

    use super::*;

    struct Counting {
        ctx: StageContext,
        seen: AtomicUsize,
        requeue_first: bool,
    }

    #[async_trait]
    impl Handler for Counting {
        fn context(&self) -> &StageContext {
            &self.ctx
        }

        async fn handle(&self, _topic: &str, _payload: &[u8]) -> Outcome {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if self.requeue_first && n == 0 {
                Outcome::Requeue
            } else {
                Outcome::Ack
            }
        }
    }

    fn counting(metrics: &StageMetrics, requeue_first: bool) -> Arc<Counting> {
        Arc::new(Counting {
            ctx: StageContext::new("test", metrics.clone(), Duration::from_secs(1)),
            seen: AtomicUsize::new(0),
            requeue_first,
        })
    }

    #[tokio::test]
    async fn priming_payload_never_reaches_the_handler() {
        let queue = Arc::new(MemoryQueue::new());
        let metrics = StageMetrics::new();
        let handler = counting(&metrics, false);
        let stage = start(handler.clone(), queue.clone(), "T", "test", 2)
            .await
            .unwrap();

        prime(queue.as_ref(), &["T"]).await.unwrap();
        queue.publish("T", Bytes::from_static(b"\x01")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stage.shutdown().await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.get("test.prime"), 1);
    }

    #[tokio::test]
    async fn requeued_delivery_is_handled_again() {
        let queue = Arc::new(MemoryQueue::new());
        let metrics = StageMetrics::new();
        let handler = counting(&metrics, true);
        let stage = start(handler.clone(), queue.clone(), "T", "test", 1)
            .await
            .unwrap();

        queue.publish("T", Bytes::from_static(b"\x01")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stage.shutdown().await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.get("test.requeue"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_call_is_transient() {
        let ctx = StageContext::new("test", StageMetrics::new(), Duration::from_millis(10));
        let result: Result<(), StoreError> = ctx
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_transient());
    }
}
