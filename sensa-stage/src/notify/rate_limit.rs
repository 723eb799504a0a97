use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sensa_store::Cache;
use tracing::trace;

use super::{Channel, Notifier, NotifyError};
use crate::worker::bounded;

const MIN_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_millis(500);

/// Minimum time between two sends on each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spacing {
    pub app: Duration,
    pub sms: Duration,
    pub email: Duration,
}

impl Spacing {
    fn of(&self, channel: Channel) -> Duration {
        match channel {
            Channel::App => self.app,
            Channel::Sms => self.sms,
            Channel::Email => self.email,
        }
    }
}

/// Holds each send until its channel has a free slot.
///
/// A slot is a cache key set with TTL equal to the channel's spacing;
/// callers that lose the race sleep and poll until the key expires. All
/// instances sharing the cache share the limit.
pub struct RateLimitedNotifier<N> {
    inner: N,
    cache: Arc<dyn Cache>,
    spacing: Spacing,
    op_timeout: Duration,
}

impl<N: Notifier> RateLimitedNotifier<N> {
    pub fn new(inner: N, cache: Arc<dyn Cache>, spacing: Spacing, op_timeout: Duration) -> Self {
        Self {
            inner,
            cache,
            spacing,
            op_timeout,
        }
    }

    async fn wait_turn(&self, channel: Channel) -> Result<(), NotifyError> {
        let spacing = self.spacing.of(channel);
        let key = format!("sensa:notify:{}", channel.as_str());
        let poll = (spacing / 4).clamp(MIN_POLL, MAX_POLL);

        loop {
            let claimed = bounded(
                self.op_timeout,
                self.cache.set_if_not_exist_ttl(&key, "", spacing),
            )
            .await?;
            if claimed {
                return Ok(());
            }

            let jitter = rand::rng().random_range(0..=poll.as_millis() as u64 / 2);
            trace!(channel = channel.as_str(), "channel busy, waiting");
            tokio::time::sleep(poll + Duration::from_millis(jitter)).await;
        }
    }
}

#[async_trait]
impl<N: Notifier> Notifier for RateLimitedNotifier<N> {
    async fn send_app(
        &self,
        user_key: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        self.wait_turn(Channel::App).await?;
        self.inner.send_app(user_key, subject, body).await
    }

    async fn send_sms(&self, phone: &str, body: &str) -> Result<(), NotifyError> {
        self.wait_turn(Channel::Sms).await?;
        self.inner.send_sms(phone, body).await
    }

    async fn send_email(
        &self,
        sender_name: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        self.wait_turn(Channel::Email).await?;
        self.inner.send_email(sender_name, to, subject, body).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sensa_store::MemoryCache;
    use tokio::time::Instant;

    use super::*;

    #[derive(Clone, Default)]
    struct Clock {
        sends: Arc<Mutex<Vec<(Channel, Instant)>>>,
    }

    impl Clock {
        fn record(&self, channel: Channel) {
            self.sends.lock().unwrap().push((channel, Instant::now()));
        }

        fn times(&self, channel: Channel) -> Vec<Instant> {
            let mut times: Vec<_> = self
                .sends
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == channel)
                .map(|(_, t)| *t)
                .collect();
            times.sort();
            times
        }
    }

    #[async_trait]
    impl Notifier for Clock {
        async fn send_app(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
            self.record(Channel::App);
            Ok(())
        }

        async fn send_sms(&self, _: &str, _: &str) -> Result<(), NotifyError> {
            self.record(Channel::Sms);
            Ok(())
        }

        async fn send_email(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
            self.record(Channel::Email);
            Ok(())
        }
    }

    fn limited(clock: &Clock, sms: Duration) -> Arc<RateLimitedNotifier<Clock>> {
        Arc::new(RateLimitedNotifier::new(
            clock.clone(),
            Arc::new(MemoryCache::new()),
            Spacing {
                app: Duration::from_millis(100),
                sms,
                email: Duration::from_millis(100),
            },
            Duration::from_secs(5),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sends_are_spaced() {
        let clock = Clock::default();
        let spacing = Duration::from_secs(1);
        let notifier = limited(&clock, spacing);

        let mut tasks = Vec::new();
        for i in 0..5 {
            let notifier = notifier.clone();
            tasks.push(tokio::spawn(async move {
                notifier.send_sms(&format!("+1555000000{i}"), "hi").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let times = clock.times(Channel::Sms);
        assert_eq!(times.len(), 5);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= spacing, "{:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn channels_do_not_block_each_other() {
        let clock = Clock::default();
        let notifier = limited(&clock, Duration::from_secs(60));
        let start = Instant::now();

        notifier.send_sms("+15550000000", "hi").await.unwrap();
        notifier.send_app("uk-1", "hi", "there").await.unwrap();
        notifier
            .send_email("Acme", "kim@acme.test", "hi", "there")
            .await
            .unwrap();

        assert_eq!(clock.times(Channel::App), vec![start]);
        assert_eq!(clock.times(Channel::Email), vec![start]);
    }
}
